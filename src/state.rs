//! Shared application state. Route groups take the narrowest sub-state they need.

use crate::auth::Authenticator;
use crate::db::{Pools, TenantSessions};
use crate::middleware::TenantGate;
use crate::provision::ProvisioningCoordinator;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pools: Pools,
    pub sessions: Arc<TenantSessions>,
    pub admin: TenantAdmin,
    pub tenant_gate: TenantGate,
    pub authenticator: Arc<dyn Authenticator>,
}

/// State for the internal provisioning endpoints.
#[derive(Clone)]
pub struct TenantAdmin {
    pub coordinator: Arc<ProvisioningCoordinator>,
    /// `None` disables the endpoints.
    pub internal_secret: Option<Arc<str>>,
}

impl FromRef<AppState> for TenantAdmin {
    fn from_ref(state: &AppState) -> Self {
        state.admin.clone()
    }
}

impl FromRef<AppState> for Pools {
    fn from_ref(state: &AppState) -> Self {
        state.pools.clone()
    }
}

impl FromRef<AppState> for Arc<TenantSessions> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
