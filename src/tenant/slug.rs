//! Deterministic schema names from tenant display names.

use crate::tenant::ServiceModule;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// PostgreSQL truncates longer identifiers; names are cut here so the registry matches the physical schema.
const MAX_IDENTIFIER_LEN: usize = 63;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]").expect("static pattern"))
}

fn repeated_underscores() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_{2,}").expect("static pattern"))
}

/// Lowercase, replace anything outside `[a-z0-9_]` with `_`, collapse runs of `_`, trim `_` at both ends.
pub fn sanitize_schema_slug(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let replaced = unsafe_chars().replace_all(&lower, "_");
    let collapsed = repeated_underscores().replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Schema name for a tenant: module prefix + slug of the display name, or of the tenant id when the
/// display name is absent or sanitizes to nothing.
pub fn schema_name_for(module: ServiceModule, tenant_id: Uuid, display_name: Option<&str>) -> String {
    let slug = display_name
        .map(sanitize_schema_slug)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| sanitize_schema_slug(&tenant_id.to_string()));
    let mut name = format!("{}{}", module.schema_prefix(), slug);
    if name.len() > MAX_IDENTIFIER_LEN {
        name.truncate(MAX_IDENTIFIER_LEN);
        let trimmed = name.trim_end_matches('_').len();
        name.truncate(trimmed);
    }
    name
}
