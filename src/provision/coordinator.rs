//! Provision a tenant schema in the operations database and record it in the registry.
//!
//! The two databases are written without a distributed transaction. The audit row carries the
//! progress (`pending -> schema_created -> success`) so a stuck attempt can be found and repaired
//! by the reconciler instead of being retried inline.

use crate::error::{AuditLogError, ProvisioningError};
use crate::provision::audit::{AuditStatus, AuditTarget, NewAuditEntry, ProvisioningAuditEntry};
use crate::provision::operations::SchemaProvisioner;
use crate::tenant::{schema_name_for, RegistryStore, ServiceModule};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct ProvisioningCoordinator {
    registry: Arc<dyn RegistryStore>,
    operations: Arc<dyn SchemaProvisioner>,
    module: ServiceModule,
    owner_role: String,
    locks: TenantLocks,
}

impl ProvisioningCoordinator {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        operations: Arc<dyn SchemaProvisioner>,
        module: ServiceModule,
        owner_role: impl Into<String>,
    ) -> Self {
        ProvisioningCoordinator {
            registry,
            operations,
            module,
            owner_role: owner_role.into(),
            locks: TenantLocks::default(),
        }
    }

    pub fn module(&self) -> ServiceModule {
        self.module
    }

    /// Create (or confirm) the tenant's schema and write its name to the registry.
    ///
    /// A schema name already in the registry is reused; otherwise it is derived from
    /// `display_name`. Repeated calls converge on the same name.
    pub async fn provision_tenant(
        &self,
        tenant_id: Uuid,
        display_name: Option<&str>,
        actor: &str,
    ) -> Result<String, ProvisioningError> {
        let _guard = self.locks.lock(tenant_id).await;

        let record = self
            .registry
            .find_tenant(tenant_id)
            .await
            .map_err(|source| ProvisioningError::RegistryRead { tenant_id, source })?
            .ok_or(ProvisioningError::UnknownTenant(tenant_id))?;

        let schema = match record.schemas.get(self.module) {
            Some(existing) => {
                tracing::info!(%tenant_id, schema = %existing, "reusing registered schema");
                existing.to_string()
            }
            None => schema_name_for(self.module, tenant_id, display_name),
        };

        let (entry, audit_err) = match self
            .registry
            .insert_audit(&NewAuditEntry {
                tenant_id,
                module: self.module,
                schema_name: schema.clone(),
                actor: actor.to_string(),
            })
            .await
        {
            Ok(id) => (Some(id), None),
            Err(source) => {
                let err = AuditLogError {
                    tenant_id,
                    operation: "insert",
                    source,
                };
                tracing::warn!(error = %err, "continuing without audit entry");
                (None, Some(err))
            }
        };

        if let Err(source) = self
            .operations
            .ensure_tenant_schema(tenant_id, &schema, &self.owner_role)
            .await
        {
            tracing::error!(%tenant_id, schema = %schema, error = %source, "schema provisioning failed");
            // Without our own row, fail whatever pending rows the tenant still has.
            let target = match entry {
                Some(id) => AuditTarget::Entry(id),
                None => AuditTarget::Pending {
                    tenant_id,
                    module: self.module,
                },
            };
            self.mark(&target, tenant_id, AuditStatus::Failed, Some(&source.to_string()))
                .await;
            return Err(ProvisioningError::SchemaCreation {
                tenant_id,
                schema,
                source,
                audit: audit_err,
            });
        }
        if let Some(id) = entry {
            self.mark(&AuditTarget::Entry(id), tenant_id, AuditStatus::SchemaCreated, None)
                .await;
        }

        match self
            .registry
            .set_module_schema(tenant_id, self.module, &schema)
            .await
        {
            Ok(0) => {
                return Err(self.registry_inconsistent(
                    tenant_id,
                    schema,
                    "tenant row disappeared from the registry".into(),
                ))
            }
            Ok(_) => {}
            Err(e) => return Err(self.registry_inconsistent(tenant_id, schema, e.to_string())),
        }

        if let Some(id) = entry {
            self.mark(&AuditTarget::Entry(id), tenant_id, AuditStatus::Success, None)
                .await;
        }
        tracing::info!(%tenant_id, schema = %schema, actor = %actor, "tenant provisioned");
        Ok(schema)
    }

    /// Registered schema name for an active tenant.
    pub async fn get_tenant_schema(&self, tenant_id: Uuid) -> Result<String, ProvisioningError> {
        let record = self
            .registry
            .find_tenant(tenant_id)
            .await
            .map_err(|source| ProvisioningError::RegistryRead { tenant_id, source })?
            .filter(|r| r.is_active)
            .ok_or(ProvisioningError::UnknownTenant(tenant_id))?;
        record
            .schemas
            .get(self.module)
            .map(str::to_string)
            .ok_or_else(|| ProvisioningError::SchemaNotRegistered {
                tenant_id,
                module: self.module.to_string(),
            })
    }

    /// Most recent provisioning attempt for the tenant, if any.
    pub async fn last_attempt(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<ProvisioningAuditEntry>, ProvisioningError> {
        self.registry
            .latest_audit(tenant_id, self.module)
            .await
            .map_err(|source| ProvisioningError::RegistryRead { tenant_id, source })
    }

    fn registry_inconsistent(&self, tenant_id: Uuid, schema: String, reason: String) -> ProvisioningError {
        tracing::error!(
            %tenant_id,
            schema = %schema,
            reason = %reason,
            "schema created but registry update failed; left for reconciliation"
        );
        ProvisioningError::RegistryUpdate {
            tenant_id,
            schema,
            reason,
        }
    }

    /// Best-effort audit transition. Failures are logged only.
    async fn mark(&self, target: &AuditTarget, tenant_id: Uuid, status: AuditStatus, error: Option<&str>) {
        if let Err(source) = self.registry.update_audit(target, status, error).await {
            let err = AuditLogError {
                tenant_id,
                operation: "update",
                source,
            };
            tracing::warn!(error = %err, status = status.as_str(), "audit status not recorded");
        }
    }
}

/// One async mutex per tenant id, so provisioning calls for the same tenant in this process run one at a time.
/// An entry lives only while some call holds or waits for it.
#[derive(Default)]
struct TenantLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    async fn lock(&self, tenant_id: Uuid) -> TenantLockGuard<'_> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(tenant_id).or_default().clone()
        };
        TenantLockGuard {
            locks: self,
            tenant_id,
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

struct TenantLockGuard<'a> {
    locks: &'a TenantLocks,
    tenant_id: Uuid,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for TenantLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map's own reference left: nobody holds or waits for this tenant.
        if map
            .get(&self.tenant_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.tenant_id);
        }
    }
}
