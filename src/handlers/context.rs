//! Tenant context: proves the request is routed to the right schema.

use crate::auth::Principal;
use crate::db::TenantSessions;
use crate::error::AppError;
use crate::extractors::RequestTenant;
use crate::response::success_one_ok;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub schema: String,
    pub search_path: String,
}

/// GET /operations/api/v1/tenant/context
pub async fn tenant_context(
    State(sessions): State<Arc<TenantSessions>>,
    principal: Principal,
    tenant: RequestTenant,
) -> Result<impl IntoResponse, AppError> {
    let mut session = sessions.acquire(tenant.tenant_id).await?;
    let search_path: String = sqlx::query_scalar("SHOW search_path")
        .fetch_one(session.connection())
        .await?;
    let context = TenantContext {
        tenant_id: session.tenant_id(),
        schema: session.schema().to_string(),
        search_path,
    };
    session.release();

    tracing::debug!(tenant_id = %context.tenant_id, subject = %principal.subject, "tenant context served");
    Ok(success_one_ok(context))
}
