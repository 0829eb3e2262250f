//! Load settings from environment variables (`TENANT_DB_*`, `DB_*`, and service keys).

use crate::config::types::{DatabaseSettings, ServiceConfig};
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Prefix for the shared tenant registry database settings.
pub const TENANT_DB_PREFIX: &str = "TENANT_DB_";
/// Prefix for the operations database settings.
pub const SERVICE_DB_PREFIX: &str = "DB_";
/// Local frontend dev server, allowed when `ALLOWED_ORIGINS` is unset.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Read configuration from the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_from_map(&vars)
}

/// Build configuration from an explicit key/value map. Empty values count as unset.
pub fn load_from_map(vars: &HashMap<String, String>) -> Result<ServiceConfig, ConfigError> {
    let get = |key: &str| -> Option<&str> {
        vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    };

    let default_tenant = match get("DEFAULT_TENANT") {
        Some(raw) => Uuid::parse_str(raw).map_err(|e| ConfigError::Invalid {
            key: "DEFAULT_TENANT".into(),
            message: e.to_string(),
        })?,
        None => Uuid::nil(),
    };

    let config = ServiceConfig {
        environment: get("ENVIRONMENT").unwrap_or("development").to_string(),
        http_address: get("HTTP_ADDRESS").unwrap_or("0.0.0.0:8080").to_string(),
        graceful_delay: duration_or(vars, "GRACEFUL_DELAY", Duration::from_secs(5))?,
        request_timeout: duration_or(vars, "REQUEST_TIMEOUT", Duration::from_secs(30))?,
        service_name: get("SERVICE_NAME").unwrap_or("operations").to_string(),
        tenant_database: database_settings(vars, TENANT_DB_PREFIX)?,
        database: database_settings(vars, SERVICE_DB_PREFIX)?,
        db_owner_role: get("DB_USER").unwrap_or("erp_user").to_string(),
        registry_schema: get("REGISTRY_SCHEMA").unwrap_or("registry").to_string(),
        default_tenant,
        internal_secret: get("FREGO_INTERNAL_SECRET").map(String::from),
        provision_script_path: get("PROVISION_SCRIPT_PATH").map(PathBuf::from),
        allowed_origins: get("ALLOWED_ORIGINS")
            .unwrap_or(DEFAULT_ALLOWED_ORIGIN)
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect(),
        reconcile_interval: duration_or(vars, "RECONCILE_INTERVAL", Duration::from_secs(5 * 60))?,
        reconcile_stale_after: duration_or(vars, "RECONCILE_STALE_AFTER", Duration::from_secs(10 * 60))?,
    };
    validate(&config)?;
    Ok(config)
}

fn database_settings(vars: &HashMap<String, String>, prefix: &str) -> Result<DatabaseSettings, ConfigError> {
    let key = |name: &str| format!("{}{}", prefix, name);
    let url_key = key("URL");
    let url = vars
        .get(&url_key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(url_key.clone()))?;
    let defaults = DatabaseSettings::new(url);
    Ok(DatabaseSettings {
        max_open_conns: number_or(vars, &key("MAX_OPEN_CONNS"), defaults.max_open_conns)?,
        min_idle_conns: number_or(vars, &key("MAX_IDLE_CONNS"), defaults.min_idle_conns)?,
        conn_max_lifetime: duration_or(vars, &key("CONN_MAX_LIFETIME"), defaults.conn_max_lifetime)?,
        prefer_simple_protocol: bool_or(vars, &key("PREFER_SIMPLE_PROTO"), defaults.prefer_simple_protocol)?,
        acquire_timeout: duration_or(vars, &key("ACQUIRE_TIMEOUT"), defaults.acquire_timeout)?,
        ..defaults
    })
}

fn number_or(vars: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, ConfigError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got '{}'", raw),
        }),
        None => Ok(default),
    }
}

fn bool_or(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_lowercase()).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                message: format!("expected a boolean, got '{}'", raw),
            }),
        },
        None => Ok(default),
    }
}

fn duration_or(vars: &HashMap<String, String>, key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::Invalid {
            key: key.to_string(),
            message: format!("expected a duration like 500ms, 5s, 5m or 1h, got '{}'", raw),
        }),
        None => Ok(default),
    }
}

/// Parse `<n><unit>` where unit is one of ms, s, m, h. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _ => None,
    }
}
