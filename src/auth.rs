//! Authenticated principal and the bearer-token boundary. Token verification itself is supplied
//! by an `Authenticator` implementation (OIDC, static keys, ...).

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity extracted from a verified token. Carried in request extensions.
#[derive(Clone, Debug, Default)]
pub struct Principal {
    pub subject: String,
    pub username: String,
    pub email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub roles: Vec<String>,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("bearer token missing")]
    MissingToken,
    #[error("token audience not accepted")]
    AudienceMismatch,
    #[error("tenant claim missing in token")]
    TenantMissing,
    #[error("invalid bearer token: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Accepts the internal service secret as a bearer token. The principal carries no tenant claim;
/// the tenant comes from the `X-Tenant-ID` header checked by the tenant middleware.
pub struct SharedSecretAuthenticator {
    secret: Arc<str>,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        SharedSecretAuthenticator {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if token != &*self.secret {
            return Err(AuthError::Invalid("token does not match the service secret".into()));
        }
        Ok(Principal {
            subject: "internal".into(),
            username: "internal".into(),
            roles: vec![INTERNAL_ROLE.into()],
            ..Default::default()
        })
    }
}

pub const INTERNAL_ROLE: &str = "internal";

/// Rejects every token. Used when no verifier is configured.
pub struct RejectAll;

#[async_trait]
impl Authenticator for RejectAll {
    async fn authenticate(&self, _token: &str) -> Result<Principal, AuthError> {
        Err(AuthError::Invalid("no token verifier configured".into()))
    }
}

/// `Authorization: Bearer <token>`, scheme case-insensitive.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Middleware: verify the bearer token and publish the `Principal`.
/// Use with `axum::middleware::from_fn_with_state(authenticator, require_principal)`.
pub async fn require_principal(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = match bearer_token(header) {
        Ok(t) => t.to_string(),
        Err(e) => return AppError::Unauthorized(e.to_string()).into_response(),
    };

    match authenticator.authenticate(&token).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e @ (AuthError::TenantMissing | AuthError::AudienceMismatch)) => {
            AppError::Forbidden(e.to_string()).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "token verification failed");
            AppError::Unauthorized("invalid bearer token".into()).into_response()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no authenticated principal".into()))
    }
}
