pub mod tenant;

pub use tenant::{tenant_id_from_headers, RequestTenant, TENANT_ID_HEADER};
