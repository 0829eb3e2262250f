//! Tenant id + service name -> schema name, enforcing activation and subscription.

use crate::error::TenantError;
use crate::tenant::{RegistryStore, ServiceModule, TenantRecord};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct SchemaResolver {
    registry: Arc<dyn RegistryStore>,
}

impl SchemaResolver {
    pub fn new(registry: Arc<dyn RegistryStore>) -> Self {
        SchemaResolver { registry }
    }

    /// Resolve by service name. Unrecognized names fail with `UnknownService`.
    pub async fn resolve_schema(&self, tenant_id: Uuid, service_name: &str) -> Result<String, TenantError> {
        let module: ServiceModule = service_name.parse()?;
        self.resolve(tenant_id, module).await
    }

    /// Schema for an active tenant subscribed to `module`. Never falls back to a default schema.
    pub async fn resolve(&self, tenant_id: Uuid, module: ServiceModule) -> Result<String, TenantError> {
        let record = self.active_tenant(tenant_id).await?;
        if !record.is_subscribed(module) {
            return Err(TenantError::ModuleNotSubscribed {
                tenant_id,
                module: module.to_string(),
            });
        }
        match record.schemas.get(module) {
            Some(schema) => Ok(schema.to_string()),
            None => Err(TenantError::SchemaMissing {
                tenant_id,
                module: module.to_string(),
            }),
        }
    }

    /// Authorization gate backed by the registry's `tenant_has_module` function.
    pub async fn verify_access(&self, tenant_id: Uuid, service_name: &str) -> Result<bool, TenantError> {
        let module: ServiceModule = service_name.parse()?;
        self.registry
            .has_module(tenant_id, module)
            .await
            .map_err(|source| TenantError::Registry { tenant_id, source })
    }

    /// Registry row for an active tenant.
    pub async fn tenant_info(&self, tenant_id: Uuid) -> Result<TenantRecord, TenantError> {
        self.active_tenant(tenant_id).await
    }

    async fn active_tenant(&self, tenant_id: Uuid) -> Result<TenantRecord, TenantError> {
        self.registry
            .find_tenant(tenant_id)
            .await
            .map_err(|source| TenantError::Registry { tenant_id, source })?
            .filter(|record| record.is_active)
            .ok_or(TenantError::NotFound(tenant_id))
    }
}
