//! Out-of-band tenant provisioning across the registry and operations databases.

pub mod audit;
pub mod coordinator;
pub mod operations;
pub mod reconcile;

pub use audit::{AuditStatus, AuditTarget, NewAuditEntry, ProvisioningAuditEntry, PROVISION_ACTION};
pub use coordinator::ProvisioningCoordinator;
pub use operations::{PgOperations, SchemaProvisioner};
pub use reconcile::{ReconcileReport, Reconciler};
