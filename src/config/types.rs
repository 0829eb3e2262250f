//! Service settings, read once at startup.

use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Connection and pool sizing for one database cluster.
#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_open_conns: u32,
    /// Read from `*_MAX_IDLE_CONNS`. sqlx has no cap on idle connections, so this is the number
    /// kept open while idle (`min_connections`), opened eagerly at startup. Idle connections above
    /// it are closed by sqlx's idle timeout.
    pub min_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    /// Simple query protocol: disables the prepared statement cache (for transaction-mode poolers).
    pub prefer_simple_protocol: bool,
    pub acquire_timeout: Duration,
}

impl DatabaseSettings {
    pub fn new(url: impl Into<String>) -> Self {
        DatabaseSettings {
            url: url.into(),
            max_open_conns: 25,
            min_idle_conns: 5,
            conn_max_lifetime: Duration::from_secs(5 * 60),
            prefer_simple_protocol: false,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub environment: String,
    pub http_address: String,
    pub graceful_delay: Duration,
    pub request_timeout: Duration,
    /// Module this deployment serves (selects the registry schema column).
    pub service_name: String,
    /// Shared tenant registry cluster.
    pub tenant_database: DatabaseSettings,
    /// Service-specific operations cluster.
    pub database: DatabaseSettings,
    /// Role that owns objects created by the provisioning procedure.
    pub db_owner_role: String,
    /// Schema holding tenant_registry and tenant_module_log in the registry database.
    pub registry_schema: String,
    pub default_tenant: Uuid,
    pub internal_secret: Option<String>,
    pub provision_script_path: Option<PathBuf>,
    /// Browser origins allowed by CORS (`ALLOWED_ORIGINS`, comma separated).
    pub allowed_origins: Vec<String>,
    pub reconcile_interval: Duration,
    pub reconcile_stale_after: Duration,
}

impl ServiceConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
