//! Internal provisioning endpoints, called by the backend with the shared `Secret` header.

use crate::error::AppError;
use crate::provision::ProvisioningAuditEntry;
use crate::response::{success_one, success_one_ok};
use crate::state::TenantAdmin;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the internal service secret.
pub const SECRET_HEADER: &str = "Secret";

const DEFAULT_ACTOR: &str = "system";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionTenantRequest {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionTenantResponse {
    pub message: String,
    pub tenant_id: Uuid,
    pub schema_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSchemaResponse {
    pub tenant_id: Uuid,
    pub schema_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<ProvisioningAuditEntry>,
}

fn require_secret(admin: &TenantAdmin, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = admin.internal_secret.as_deref() else {
        return Err(AppError::Forbidden("internal endpoints are disabled".into()));
    };
    let given = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Secret header".into()))?;
    if given != expected {
        return Err(AppError::Unauthorized("invalid Secret header".into()));
    }
    Ok(())
}

/// POST /tenants/provision
pub async fn provision_tenant(
    State(admin): State<TenantAdmin>,
    headers: HeaderMap,
    Json(body): Json<ProvisionTenantRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_secret(&admin, &headers)?;
    if body.tenant_id.is_nil() {
        return Err(AppError::BadRequest("tenantId must not be the nil uuid".into()));
    }
    let actor = body
        .actor
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTOR);

    let schema_name = admin
        .coordinator
        .provision_tenant(body.tenant_id, body.display_name.as_deref(), actor)
        .await?;

    Ok(success_one(ProvisionTenantResponse {
        message: "tenant schema provisioned".into(),
        tenant_id: body.tenant_id,
        schema_name,
    }))
}

/// GET /tenants/:tenant_id/schema
pub async fn get_tenant_schema(
    State(admin): State<TenantAdmin>,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_secret(&admin, &headers)?;
    let schema_name = admin.coordinator.get_tenant_schema(tenant_id).await?;
    let last_attempt = admin.coordinator.last_attempt(tenant_id).await?;
    Ok(success_one_ok(TenantSchemaResponse {
        tenant_id,
        schema_name,
        last_attempt,
    }))
}
