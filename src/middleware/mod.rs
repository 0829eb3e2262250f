pub mod tenant;

pub use tenant::{tenant_access, TenantGate};
