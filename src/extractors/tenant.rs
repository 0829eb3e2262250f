//! Tenant id from the `X-Tenant-ID` header, and the verified tenant published by the access middleware.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use uuid::Uuid;

/// Header name for tenant id.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// Tenant id from the header when present and a valid UUID.
pub fn tenant_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(tenant_id = %s, error = %e, "invalid tenant id in header, using default");
                None
            }
        })
}

/// Tenant verified active by `tenant_access`. Handlers take this instead of reading headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTenant {
    pub tenant_id: Uuid,
    /// True when the header was absent or invalid and the configured default was used.
    pub defaulted: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestTenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestTenant>()
            .copied()
            .ok_or_else(|| AppError::Internal("tenant access middleware not installed on this route".into()))
    }
}
