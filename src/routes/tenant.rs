//! Internal provisioning routes.

use crate::handlers::tenant::{get_tenant_schema, provision_tenant};
use crate::state::TenantAdmin;
use axum::{routing::get, routing::post, Router};

pub fn tenant_routes(admin: TenantAdmin) -> Router {
    Router::new()
        .route("/tenants/provision", post(provision_tenant))
        .route("/tenants/:tenant_id/schema", get(get_tenant_schema))
        .with_state(admin)
}
