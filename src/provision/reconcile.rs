//! Background consistency check for attempts stuck between schema creation and the registry write.

use crate::provision::audit::{AuditStatus, AuditTarget, ProvisioningAuditEntry};
use crate::provision::operations::SchemaProvisioner;
use crate::tenant::{RegistryStore, ServiceModule};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Registry column written, attempt marked success.
    pub repaired: usize,
    /// Registry already matched, attempt marked success.
    pub confirmed: usize,
    /// Physical schema missing, attempt marked failed.
    pub failed: usize,
    /// Registry holds a different schema; left for an operator.
    pub conflicts: usize,
    /// Could not be checked this round.
    pub errors: usize,
}

enum Outcome {
    Repaired,
    Confirmed,
    Failed,
    Conflict,
}

pub struct Reconciler {
    registry: Arc<dyn RegistryStore>,
    operations: Arc<dyn SchemaProvisioner>,
    module: ServiceModule,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        operations: Arc<dyn SchemaProvisioner>,
        module: ServiceModule,
        stale_after: Duration,
    ) -> Self {
        Reconciler {
            registry,
            operations,
            module,
            stale_after,
        }
    }

    /// One pass over attempts left in `schema_created` for longer than `stale_after`.
    pub async fn run_once(&self) -> Result<ReconcileReport, sqlx::Error> {
        let stale = chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::MAX);
        let cutoff = chrono::Utc::now()
            .checked_sub_signed(stale)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        let stalled = self.registry.stalled_audits(self.module, cutoff).await?;

        let mut report = ReconcileReport::default();
        for entry in stalled {
            match self.reconcile_entry(&entry).await {
                Ok(Outcome::Repaired) => report.repaired += 1,
                Ok(Outcome::Confirmed) => report.confirmed += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Conflict) => report.conflicts += 1,
                Err(e) => {
                    tracing::warn!(tenant_id = %entry.tenant_id, audit_id = entry.id, error = %e, "reconcile check failed");
                    report.errors += 1;
                }
            }
        }
        if report != ReconcileReport::default() {
            tracing::info!(?report, module = %self.module, "reconciliation pass finished");
        }
        Ok(report)
    }

    async fn reconcile_entry(&self, entry: &ProvisioningAuditEntry) -> Result<Outcome, sqlx::Error> {
        let target = AuditTarget::Entry(entry.id);
        let tenant_id = entry.tenant_id;

        if !self.operations.schema_exists(&entry.schema_name).await? {
            self.registry
                .update_audit(
                    &target,
                    AuditStatus::Failed,
                    Some("schema not found in operations database during reconciliation"),
                )
                .await?;
            return Ok(Outcome::Failed);
        }

        let registered = self
            .registry
            .find_tenant(tenant_id)
            .await?
            .and_then(|r| r.schemas.get(self.module).map(str::to_string));

        match registered {
            Some(name) if name == entry.schema_name => {
                self.registry.update_audit(&target, AuditStatus::Success, None).await?;
                Ok(Outcome::Confirmed)
            }
            Some(other) => {
                tracing::warn!(
                    %tenant_id,
                    registered = %other,
                    created = %entry.schema_name,
                    "registry names a different schema; not overwriting"
                );
                Ok(Outcome::Conflict)
            }
            None => {
                let updated = self
                    .registry
                    .set_module_schema(tenant_id, self.module, &entry.schema_name)
                    .await?;
                if updated == 0 {
                    return Ok(Outcome::Conflict);
                }
                self.registry.update_audit(&target, AuditStatus::Success, None).await?;
                tracing::info!(%tenant_id, schema = %entry.schema_name, "registry repaired");
                Ok(Outcome::Repaired)
            }
        }
    }

    /// Run `run_once` every `interval` until `shutdown` flips to true.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::warn!(error = %e, "reconciliation pass failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("reconciler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
