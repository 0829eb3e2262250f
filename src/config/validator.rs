//! Settings validation: pool sizing and identifiers that end up in SQL.

use crate::config::types::{DatabaseSettings, ServiceConfig};
use crate::error::ConfigError;
use crate::tenant::ServiceModule;

pub fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    validate_database("TENANT_DB_", &config.tenant_database)?;
    validate_database("DB_", &config.database)?;

    config
        .service_name
        .parse::<ServiceModule>()
        .map_err(|e| ConfigError::Invalid {
            key: "SERVICE_NAME".into(),
            message: e.to_string(),
        })?;

    if !is_plain_identifier(&config.db_owner_role) {
        return Err(ConfigError::Invalid {
            key: "DB_USER".into(),
            message: format!("'{}' is not a valid role name", config.db_owner_role),
        });
    }
    if !is_plain_identifier(&config.registry_schema) {
        return Err(ConfigError::Invalid {
            key: "REGISTRY_SCHEMA".into(),
            message: format!("'{}' is not a valid schema name", config.registry_schema),
        });
    }
    for (key, value) in [
        ("REQUEST_TIMEOUT", config.request_timeout),
        ("RECONCILE_INTERVAL", config.reconcile_interval),
    ] {
        if value.is_zero() {
            return Err(ConfigError::Invalid {
                key: key.into(),
                message: "must be greater than zero".into(),
            });
        }
    }
    Ok(())
}

fn validate_database(prefix: &str, db: &DatabaseSettings) -> Result<(), ConfigError> {
    if !(db.url.starts_with("postgres://") || db.url.starts_with("postgresql://")) {
        return Err(ConfigError::Invalid {
            key: format!("{}URL", prefix),
            message: "expected a postgres:// connection string".into(),
        });
    }
    if db.max_open_conns == 0 {
        return Err(ConfigError::Invalid {
            key: format!("{}MAX_OPEN_CONNS", prefix),
            message: "must be at least 1".into(),
        });
    }
    if db.min_idle_conns > db.max_open_conns {
        return Err(ConfigError::Invalid {
            key: format!("{}MAX_IDLE_CONNS", prefix),
            message: format!(
                "{} exceeds MAX_OPEN_CONNS ({})",
                db.min_idle_conns, db.max_open_conns
            ),
        });
    }
    Ok(())
}

/// Letter or underscore first, then `[A-Za-z0-9_]`, at most 63 bytes (PostgreSQL NAMEDATALEN - 1).
fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
