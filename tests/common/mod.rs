//! In-memory stand-ins for the registry, the operations database, the connection pool and the
//! token verifier. Shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use operations_tenancy::auth::{AuthError, Authenticator, Principal};
use operations_tenancy::db::{ConnectionSource, ScriptRunner, SessionConnection};
use operations_tenancy::provision::{
    AuditStatus, AuditTarget, NewAuditEntry, ProvisioningAuditEntry, SchemaProvisioner, PROVISION_ACTION,
};
use operations_tenancy::tenant::{ModuleSchemas, RegistryStore, ServiceModule, TenantRecord};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const INACTIVE_TENANT: &str = "11111111-1111-1111-1111-111111111111";
pub const ACME_TENANT: &str = "22222222-2222-2222-2222-222222222222";
pub const GLOBEX_TENANT: &str = "33333333-3333-3333-3333-333333333333";

pub fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected failure: {}", what))
}

pub fn tenant(
    tenant_id: Uuid,
    display_name: &str,
    is_active: bool,
    modules: &[&str],
    operations_schema: Option<&str>,
) -> TenantRecord {
    let mut schemas = ModuleSchemas::default();
    if let Some(schema) = operations_schema {
        schemas.set(ServiceModule::Operations, schema);
    }
    TenantRecord {
        tenant_id,
        slug: display_name.to_lowercase().replace(' ', "-"),
        display_name: display_name.to_string(),
        contact_email: None,
        is_active,
        modules_subscribed: modules.iter().map(|m| m.to_string()).collect(),
        schemas,
        modified_at: None,
    }
}

/// Registry with the three standard tenants: inactive, acme (provisioned) and globex (not provisioned).
pub fn seeded_registry() -> Arc<FakeRegistry> {
    let registry = FakeRegistry::default();
    registry.put_tenant(tenant(uuid(INACTIVE_TENANT), "Dormant Ltd", false, &["operations"], Some("ops_dormant")));
    registry.put_tenant(tenant(uuid(ACME_TENANT), "Acme & Co.!!", true, &["operations", "finance"], Some("ops_acme")));
    registry.put_tenant(tenant(uuid(GLOBEX_TENANT), "Globex", true, &["operations"], None));
    Arc::new(registry)
}

#[derive(Default)]
pub struct FakeRegistry {
    tenants: Mutex<HashMap<Uuid, TenantRecord>>,
    audits: Mutex<Vec<ProvisioningAuditEntry>>,
    next_audit_id: AtomicI64,
    pub fail_reads: AtomicBool,
    pub fail_audit_insert: AtomicBool,
    pub fail_audit_update: AtomicBool,
    pub fail_schema_update: AtomicBool,
    pub schema_updates: AtomicUsize,
}

impl FakeRegistry {
    pub fn put_tenant(&self, record: TenantRecord) {
        self.tenants.lock().unwrap().insert(record.tenant_id, record);
    }

    pub fn remove_tenant(&self, tenant_id: Uuid) {
        self.tenants.lock().unwrap().remove(&tenant_id);
    }

    pub fn tenant(&self, tenant_id: Uuid) -> Option<TenantRecord> {
        self.tenants.lock().unwrap().get(&tenant_id).cloned()
    }

    pub fn audits(&self) -> Vec<ProvisioningAuditEntry> {
        self.audits.lock().unwrap().clone()
    }

    /// Append a row directly, e.g. one left behind by an earlier crashed attempt.
    pub fn push_audit(
        &self,
        tenant_id: Uuid,
        schema_name: &str,
        status: AuditStatus,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let id = self.next_audit_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.audits.lock().unwrap().push(ProvisioningAuditEntry {
            id,
            tenant_id,
            module_name: ServiceModule::Operations.as_str().to_string(),
            action: PROVISION_ACTION.to_string(),
            schema_name: schema_name.to_string(),
            status,
            error_message: None,
            actor: Some("test".into()),
            created_at,
        });
        id
    }

    fn check_reads(&self) -> Result<(), sqlx::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("registry read"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FakeRegistry {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, sqlx::Error> {
        self.check_reads()?;
        Ok(self.tenant(tenant_id))
    }

    async fn is_active(&self, tenant_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check_reads()?;
        Ok(self.tenant(tenant_id).map(|t| t.is_active).unwrap_or(false))
    }

    async fn has_module(&self, tenant_id: Uuid, module: ServiceModule) -> Result<bool, sqlx::Error> {
        self.check_reads()?;
        Ok(self
            .tenant(tenant_id)
            .map(|t| t.is_active && t.is_subscribed(module))
            .unwrap_or(false))
    }

    async fn set_module_schema(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
        schema: &str,
    ) -> Result<u64, sqlx::Error> {
        if self.fail_schema_update.load(Ordering::SeqCst) {
            return Err(injected("registry schema update"));
        }
        let mut tenants = self.tenants.lock().unwrap();
        match tenants.get_mut(&tenant_id) {
            Some(record) => {
                record.schemas.set(module, schema);
                record.modified_at = Some(Utc::now());
                self.schema_updates.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<i64, sqlx::Error> {
        if self.fail_audit_insert.load(Ordering::SeqCst) {
            return Err(injected("audit insert"));
        }
        let id = self.next_audit_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.audits.lock().unwrap().push(ProvisioningAuditEntry {
            id,
            tenant_id: entry.tenant_id,
            module_name: entry.module.as_str().to_string(),
            action: PROVISION_ACTION.to_string(),
            schema_name: entry.schema_name.clone(),
            status: AuditStatus::Pending,
            error_message: None,
            actor: Some(entry.actor.clone()),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_audit(
        &self,
        target: &AuditTarget,
        status: AuditStatus,
        error: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        if self.fail_audit_update.load(Ordering::SeqCst) {
            return Err(injected("audit update"));
        }
        let mut audits = self.audits.lock().unwrap();
        let mut updated = 0;
        for row in audits.iter_mut() {
            let matches = match target {
                AuditTarget::Entry(id) => row.id == *id,
                AuditTarget::Pending { tenant_id, module } => {
                    row.tenant_id == *tenant_id
                        && row.module_name == module.as_str()
                        && row.status == AuditStatus::Pending
                }
            };
            if matches {
                row.status = status;
                if let Some(message) = error {
                    row.error_message = Some(message.to_string());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn latest_audit(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
    ) -> Result<Option<ProvisioningAuditEntry>, sqlx::Error> {
        self.check_reads()?;
        Ok(self
            .audits
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.module_name == module.as_str())
            .max_by_key(|a| a.id)
            .cloned())
    }

    async fn stalled_audits(
        &self,
        module: ServiceModule,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningAuditEntry>, sqlx::Error> {
        self.check_reads()?;
        let audits = self.audits.lock().unwrap();
        let mut latest: HashMap<Uuid, &ProvisioningAuditEntry> = HashMap::new();
        for row in audits.iter().filter(|a| a.module_name == module.as_str()) {
            let keep = latest.get(&row.tenant_id).map(|cur| row.id > cur.id).unwrap_or(true);
            if keep {
                latest.insert(row.tenant_id, row);
            }
        }
        let mut stalled: Vec<ProvisioningAuditEntry> = latest
            .into_values()
            .filter(|a| a.status == AuditStatus::SchemaCreated && a.created_at < cutoff)
            .cloned()
            .collect();
        stalled.sort_by_key(|a| a.id);
        Ok(stalled)
    }
}

/// Operations database: remembers which schemas exist and every procedure call.
#[derive(Default)]
pub struct FakeOperations {
    schemas: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(Uuid, String, String)>>,
    fail_with: Mutex<Option<String>>,
    pub fail_exists_check: AtomicBool,
    /// Delay inside the procedure, to widen race windows.
    pub delay: Mutex<Option<Duration>>,
}

impl FakeOperations {
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn add_schema(&self, schema: &str) {
        self.schemas.lock().unwrap().insert(schema.to_string());
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.schemas.lock().unwrap().contains(schema)
    }

    pub fn calls(&self) -> Vec<(Uuid, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaProvisioner for FakeOperations {
    async fn ensure_tenant_schema(
        &self,
        tenant_id: Uuid,
        schema: &str,
        owner_role: &str,
    ) -> Result<(), sqlx::Error> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((tenant_id, schema.to_string(), owner_role.to_string()));
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(sqlx::Error::Protocol(message));
        }
        self.schemas.lock().unwrap().insert(schema.to_string());
        Ok(())
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool, sqlx::Error> {
        if self.fail_exists_check.load(Ordering::SeqCst) {
            return Err(injected("schema lookup"));
        }
        Ok(self.has_schema(schema))
    }
}

/// Pool stand-in. Tracks how many connections are checked out and every statement run, per connection.
#[derive(Clone, Default)]
pub struct FakePool {
    pub outstanding: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
    pub statements: Arc<Mutex<Vec<(usize, String)>>>,
    pub fail_acquire: Arc<AtomicBool>,
    pub fail_statements: Arc<AtomicBool>,
}

impl FakePool {
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn statements_for(&self, conn_id: usize) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == conn_id)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

pub struct FakeConnection {
    pub id: usize,
    pool: FakePool,
}

#[async_trait]
impl SessionConnection for FakeConnection {
    async fn execute_statement(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        self.pool.statements.lock().unwrap().push((self.id, sql.to_string()));
        if self.pool.fail_statements.load(Ordering::SeqCst) {
            return Err(injected("statement"));
        }
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionSource for FakePool {
    type Conn = FakeConnection;

    async fn acquire_connection(&self) -> Result<FakeConnection, sqlx::Error> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeConnection {
            id,
            pool: self.clone(),
        })
    }
}

/// Script runner that counts executions and can fail the first N.
#[derive(Default)]
pub struct FakeScriptRunner {
    pub runs: AtomicUsize,
    pub failures_left: AtomicUsize,
    pub last_script: Mutex<Option<String>>,
    pub delay: Option<Duration>,
}

#[async_trait]
impl ScriptRunner for FakeScriptRunner {
    async fn run_script(&self, script: &str) -> Result<(), sqlx::Error> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_script.lock().unwrap() = Some(script.to_string());
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(injected("script"));
        }
        Ok(())
    }
}

/// Tokens: "valid" (tenant claim for acme), "no-tenant" (claim missing), anything else invalid.
pub struct FakeAuthenticator;

pub const VALID_TOKEN: &str = "valid";
pub const NO_TENANT_TOKEN: &str = "no-tenant";

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        match token {
            VALID_TOKEN => Ok(Principal {
                subject: "user-1".into(),
                username: "dispatcher".into(),
                email: Some("dispatcher@example.com".into()),
                tenant_id: Some(uuid(ACME_TENANT)),
                roles: vec!["ops_user".into()],
            }),
            NO_TENANT_TOKEN => Err(AuthError::TenantMissing),
            _ => Err(AuthError::Invalid("unknown token".into())),
        }
    }
}

/// Unique scratch file path under the system temp dir.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{}-{}", Uuid::new_v4(), name))
}
