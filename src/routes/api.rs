//! Tenant-scoped API routes under `/operations/api/v1`.

use crate::auth::{require_principal, Authenticator};
use crate::handlers::context::tenant_context;
use crate::middleware::{tenant_access, TenantGate};
use crate::state::AppState;
use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;

pub const API_PREFIX: &str = "/operations/api/v1";

/// Wrap routes with bearer auth, then the tenant gate. Auth runs first.
pub fn tenant_scoped(router: Router, authenticator: Arc<dyn Authenticator>, gate: TenantGate) -> Router {
    router
        .route_layer(from_fn_with_state(gate, tenant_access))
        .route_layer(from_fn_with_state(authenticator, require_principal))
}

pub fn api_routes(state: AppState) -> Router {
    let routes = Router::new()
        .route(&format!("{}/tenant/context", API_PREFIX), get(tenant_context))
        .with_state(state.sessions.clone());
    tenant_scoped(routes, state.authenticator, state.tenant_gate)
}
