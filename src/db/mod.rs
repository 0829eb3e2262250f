//! Operations database plumbing: pools, tenant sessions, and the provisioning procedure installer.

pub mod installer;
pub mod pool;
pub mod session;

pub use installer::{Installer, ScriptRunner, DEFAULT_SCRIPT_CANDIDATES};
pub use pool::{open_pool, pool_options, PoolKind, Pools};
pub use session::{ConnectionSource, SessionConnection, TenantSession, TenantSessions};
