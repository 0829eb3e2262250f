//! Per-request tenant gate: header (or default) -> registry active check -> request extensions.

use crate::error::AppError;
use crate::extractors::tenant::{tenant_id_from_headers, RequestTenant};
use crate::tenant::RegistryStore;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

/// State for `tenant_access`.
#[derive(Clone)]
pub struct TenantGate {
    registry: Arc<dyn RegistryStore>,
    default_tenant: Uuid,
}

impl TenantGate {
    pub fn new(registry: Arc<dyn RegistryStore>, default_tenant: Uuid) -> Self {
        TenantGate {
            registry,
            default_tenant,
        }
    }
}

/// Missing or malformed header never rejects on its own; the default tenant is checked instead.
/// Unknown or inactive tenant -> 403; registry failure -> 500. No retries.
/// Use with `axum::middleware::from_fn_with_state(gate, tenant_access)`.
pub async fn tenant_access(State(gate): State<TenantGate>, mut req: Request, next: Next) -> Response {
    let (tenant_id, defaulted) = match tenant_id_from_headers(req.headers()) {
        Some(id) => (id, false),
        None => (gate.default_tenant, true),
    };

    match gate.registry.is_active(tenant_id).await {
        Ok(true) => {
            req.extensions_mut().insert(RequestTenant { tenant_id, defaulted });
            next.run(req).await
        }
        Ok(false) => {
            tracing::warn!(%tenant_id, "tenant not found or inactive");
            AppError::Forbidden("tenant not found or inactive".into()).into_response()
        }
        Err(e) => {
            tracing::error!(%tenant_id, error = %e, "failed to verify tenant");
            AppError::Internal("internal server error".into()).into_response()
        }
    }
}
