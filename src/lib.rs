//! Operations tenancy: per-tenant schema routing, tenant-scoped sessions and on-demand schema
//! provisioning for the operations service.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod provision;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod tenant;

pub use auth::{Authenticator, Principal};
pub use config::{load_from_env, validate, DatabaseSettings, ServiceConfig};
pub use db::{Installer, Pools, TenantSession, TenantSessions};
pub use error::{
    AppError, ConfigError, ConnectionError, InstallError, ProvisioningError, SessionError, TenantError,
};
pub use extractors::RequestTenant;
pub use middleware::TenantGate;
pub use provision::{PgOperations, ProvisioningCoordinator, Reconciler};
pub use routes::app_router;
pub use state::{AppState, TenantAdmin};
pub use tenant::{PgRegistry, SchemaResolver, ServiceModule};
