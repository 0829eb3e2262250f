//! Reconciler: repairing attempts stuck between schema creation and the registry write.

mod common;

use chrono::Utc;
use common::*;
use operations_tenancy::provision::{AuditStatus, ProvisioningCoordinator, ReconcileReport, Reconciler};
use operations_tenancy::tenant::ServiceModule;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const STALE_AFTER: Duration = Duration::from_secs(600);

fn reconciler(registry: &Arc<FakeRegistry>, operations: &Arc<FakeOperations>) -> Reconciler {
    Reconciler::new(registry.clone(), operations.clone(), ServiceModule::Operations, STALE_AFTER)
}

fn long_ago() -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(30)
}

fn status_of(registry: &FakeRegistry, id: i64) -> AuditStatus {
    registry.audits().into_iter().find(|a| a.id == id).unwrap().status
}

#[tokio::test]
async fn writes_missing_registry_entry() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.add_schema("ops_globex");
    let id = registry.push_audit(uuid(GLOBEX_TENANT), "ops_globex", AuditStatus::SchemaCreated, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();

    assert_eq!(report, ReconcileReport { repaired: 1, ..Default::default() });
    assert_eq!(
        registry.tenant(uuid(GLOBEX_TENANT)).unwrap().schemas.get(ServiceModule::Operations),
        Some("ops_globex")
    );
    assert_eq!(status_of(&registry, id), AuditStatus::Success);
}

#[tokio::test]
async fn confirms_when_registry_already_matches() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.add_schema("ops_acme");
    let id = registry.push_audit(uuid(ACME_TENANT), "ops_acme", AuditStatus::SchemaCreated, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();

    assert_eq!(report.confirmed, 1);
    assert_eq!(registry.schema_updates.load(Ordering::SeqCst), 0);
    assert_eq!(status_of(&registry, id), AuditStatus::Success);
}

#[tokio::test]
async fn leaves_conflicting_registry_entry_alone() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.add_schema("ops_acme_old");
    let id = registry.push_audit(uuid(ACME_TENANT), "ops_acme_old", AuditStatus::SchemaCreated, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(
        registry.tenant(uuid(ACME_TENANT)).unwrap().schemas.get(ServiceModule::Operations),
        Some("ops_acme")
    );
    assert_eq!(status_of(&registry, id), AuditStatus::SchemaCreated);
}

#[tokio::test]
async fn marks_failed_when_schema_is_gone() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    let id = registry.push_audit(uuid(GLOBEX_TENANT), "ops_globex", AuditStatus::SchemaCreated, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();

    assert_eq!(report.failed, 1);
    let entry = registry.audits().into_iter().find(|a| a.id == id).unwrap();
    assert_eq!(entry.status, AuditStatus::Failed);
    assert!(entry.error_message.unwrap().contains("schema not found"));
}

#[tokio::test]
async fn ignores_recent_and_superseded_attempts() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.add_schema("ops_globex");
    // Still within the grace period.
    registry.push_audit(uuid(GLOBEX_TENANT), "ops_globex", AuditStatus::SchemaCreated, Utc::now());
    // Stuck, but a newer attempt for the same tenant finished.
    registry.push_audit(uuid(ACME_TENANT), "ops_acme", AuditStatus::SchemaCreated, long_ago());
    registry.push_audit(uuid(ACME_TENANT), "ops_acme", AuditStatus::Success, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();

    assert_eq!(report, ReconcileReport::default());
    assert_eq!(registry.schema_updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn per_entry_errors_are_counted_not_fatal() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.fail_exists_check.store(true, Ordering::SeqCst);
    registry.push_audit(uuid(GLOBEX_TENANT), "ops_globex", AuditStatus::SchemaCreated, long_ago());

    let report = reconciler(&registry, &operations).run_once().await.unwrap();
    assert_eq!(report.errors, 1);
}

#[tokio::test]
async fn repairs_what_a_failed_registry_write_left_behind() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    let coordinator =
        ProvisioningCoordinator::new(registry.clone(), operations.clone(), ServiceModule::Operations, "erp_user");

    registry.fail_schema_update.store(true, Ordering::SeqCst);
    assert!(coordinator
        .provision_tenant(uuid(GLOBEX_TENANT), Some("Globex"), "system")
        .await
        .is_err());
    registry.fail_schema_update.store(false, Ordering::SeqCst);

    let immediate = Reconciler::new(registry.clone(), operations.clone(), ServiceModule::Operations, Duration::ZERO);
    // The attempt row was created "now"; give the cutoff a moment to pass it.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = immediate.run_once().await.unwrap();

    assert_eq!(report.repaired, 1);
    assert_eq!(coordinator.get_tenant_schema(uuid(GLOBEX_TENANT)).await.unwrap(), "ops_globex");
}

#[tokio::test]
async fn background_task_stops_on_shutdown() {
    let registry = seeded_registry();
    let operations = Arc::new(FakeOperations::default());
    operations.add_schema("ops_globex");
    registry.push_audit(uuid(GLOBEX_TENANT), "ops_globex", AuditStatus::SchemaCreated, long_ago());

    let (tx, rx) = watch::channel(false);
    let handle = reconciler(&registry, &operations).spawn(Duration::from_millis(10), rx);

    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.schema_updates.load(Ordering::SeqCst), 1);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("reconciler did not stop")
        .unwrap();
}
