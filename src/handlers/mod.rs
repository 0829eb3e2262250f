//! HTTP handlers for tenant provisioning and tenant-scoped context.

pub mod context;
pub mod tenant;

pub use context::tenant_context;
pub use tenant::{get_tenant_schema, provision_tenant, SECRET_HEADER};
