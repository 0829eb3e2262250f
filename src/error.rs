//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Startup configuration problems. The process must not start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Pool open or liveness probe failure. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("invalid database url for {pool}: {source}")]
    InvalidUrl {
        pool: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("open {pool} pool: {source}")]
    Open {
        pool: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("ping {pool} database: {source}")]
    Ping {
        pool: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Request-scoped tenant resolution failures.
#[derive(Error, Debug)]
pub enum TenantError {
    #[error("tenant {0} not found or inactive")]
    NotFound(Uuid),
    #[error("tenant {tenant_id} is not subscribed to the {module} module")]
    ModuleNotSubscribed { tenant_id: Uuid, module: String },
    #[error("tenant {tenant_id} has no schema for the {module} module")]
    SchemaMissing { tenant_id: Uuid, module: String },
    #[error("unknown service name: {0}")]
    UnknownService(String),
    #[error("tenant {tenant_id} does not have access to the {module} module")]
    AccessDenied { tenant_id: Uuid, module: String },
    #[error("query tenant registry for {tenant_id}: {source}")]
    Registry {
        tenant_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
}

impl TenantError {
    /// True for outcomes that mean "this tenant may not use this service" rather than an outage.
    pub fn is_access_failure(&self) -> bool {
        !matches!(self, TenantError::Registry { .. })
    }
}

/// Failures while handing out a tenant-scoped connection.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("get tenant schema: {0}")]
    Resolve(#[from] TenantError),
    #[error("acquire connection for tenant {tenant_id}: {source}")]
    Acquire {
        tenant_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("set search path to {schema} for tenant {tenant_id}: {source}")]
    SearchPath {
        tenant_id: Uuid,
        schema: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Best-effort audit trail failure. Logged, never fatal on its own.
#[derive(Error, Debug)]
#[error("audit log {operation} failed for tenant {tenant_id}: {source}")]
pub struct AuditLogError {
    pub tenant_id: Uuid,
    pub operation: &'static str,
    #[source]
    pub source: sqlx::Error,
}

fn audit_suffix(audit: &Option<AuditLogError>) -> String {
    audit
        .as_ref()
        .map(|e| format!("; also {}", e))
        .unwrap_or_default()
}

/// Administrative provisioning failures.
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("tenant {0} is not present in the tenant registry")]
    UnknownTenant(Uuid),
    #[error("read tenant registry for {tenant_id}: {source}")]
    RegistryRead {
        tenant_id: Uuid,
        #[source]
        source: sqlx::Error,
    },
    #[error("provision tenant schema {schema} for {tenant_id}: {source}{}", audit_suffix(.audit))]
    SchemaCreation {
        tenant_id: Uuid,
        schema: String,
        #[source]
        source: sqlx::Error,
        audit: Option<AuditLogError>,
    },
    #[error(
        "schema {schema} exists for tenant {tenant_id} but the tenant registry was not updated \
         (registry is inconsistent until reconciled): {reason}"
    )]
    RegistryUpdate {
        tenant_id: Uuid,
        schema: String,
        reason: String,
    },
    #[error("tenant {tenant_id} has no {module} schema registered")]
    SchemaNotRegistered { tenant_id: Uuid, module: String },
}

/// Installer script loading or execution failure.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("load provisioning script (tried {tried}): {source}")]
    Load {
        tried: String,
        #[source]
        source: std::io::Error,
    },
    #[error("provisioning script is empty: {0}")]
    Empty(String),
    #[error("execute provisioning script: {0}")]
    Execute(#[source] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tenant(#[from] TenantError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Tenant resolution failures all render the same way so callers cannot probe which tenants exist.
const TENANT_FORBIDDEN_MESSAGE: &str = "tenant not found or inactive";

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Tenant(e) if e.is_access_failure() => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Session(SessionError::Resolve(e)) if e.is_access_failure() => {
                (StatusCode::FORBIDDEN, "forbidden")
            }
            AppError::Tenant(_) | AppError::Session(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            AppError::Provisioning(ProvisioningError::UnknownTenant(_))
            | AppError::Provisioning(ProvisioningError::SchemaNotRegistered { .. }) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            AppError::Provisioning(ProvisioningError::RegistryUpdate { .. }) => {
                (StatusCode::BAD_GATEWAY, "registry_inconsistent")
            }
            AppError::Provisioning(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provisioning_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::FORBIDDEN
            && matches!(self, AppError::Tenant(_) | AppError::Session(_))
        {
            tracing::warn!(error = %self, "tenant access rejected");
            TENANT_FORBIDDEN_MESSAGE.to_string()
        } else {
            if status.is_server_error() {
                tracing::error!(error = %self, "request failed");
            }
            self.to_string()
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
