//! Identifier quoting and the session statements built from tenant schema names.

/// Statement issued when a connection goes back to the pool, so no tenant search path outlives its session.
pub const RESET_SEARCH_PATH: &str = "RESET search_path";

/// Double-quote a PostgreSQL identifier. Embedded double quotes are doubled, so any input
/// (including names read back from the registry) stays a single identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified, quoted table name (e.g. `"registry"."tenant_registry"`).
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// `SET search_path TO "<schema>", public`. Session scoped (not `SET LOCAL`) so it holds across transactions.
pub fn search_path_statement(schema: &str) -> String {
    format!("SET search_path TO {}, public", quote_ident(schema))
}
