//! Shared tenant registry access. Every call is a live query: activation and subscriptions can
//! change between requests and the registry is the authority for access control.

use crate::provision::audit::{
    AuditStatus, AuditTarget, NewAuditEntry, ProvisioningAuditEntry, PROVISION_ACTION,
};
use crate::sql::qualified;
use crate::tenant::{ModuleSchemas, ServiceModule, TenantRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Registry reads and the writes this service owns (its schema column and the audit log).
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// The tenant row regardless of activation, or None.
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, sqlx::Error>;

    /// `EXISTS(tenant_id) AND is_active`.
    async fn is_active(&self, tenant_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Registry-side `tenant_has_module(tenant_id, module)`.
    async fn has_module(&self, tenant_id: Uuid, module: ServiceModule) -> Result<bool, sqlx::Error>;

    /// Write the module schema column and bump `modified_at`. Returns rows updated.
    async fn set_module_schema(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
        schema: &str,
    ) -> Result<u64, sqlx::Error>;

    /// Insert a `pending` provision row. Returns its id.
    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<i64, sqlx::Error>;

    /// Move matching rows to `status`, recording `error` when given. Returns rows updated.
    async fn update_audit(
        &self,
        target: &AuditTarget,
        status: AuditStatus,
        error: Option<&str>,
    ) -> Result<u64, sqlx::Error>;

    /// Newest provision row for the tenant and module.
    async fn latest_audit(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
    ) -> Result<Option<ProvisioningAuditEntry>, sqlx::Error>;

    /// Newest provision row per tenant where that row is still `schema_created` and was created before `cutoff`.
    async fn stalled_audits(
        &self,
        module: ServiceModule,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningAuditEntry>, sqlx::Error>;
}

/// PostgreSQL registry. Tables live in `registry_schema` (default `registry`).
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
    tenants_table: String,
    log_table: String,
    has_module_fn: String,
}

impl PgRegistry {
    pub fn new(pool: PgPool, registry_schema: &str) -> Self {
        PgRegistry {
            pool,
            tenants_table: qualified(registry_schema, "tenant_registry"),
            log_table: qualified(registry_schema, "tenant_module_log"),
            has_module_fn: qualified(registry_schema, "tenant_has_module"),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    tenant_id: Uuid,
    tenant_slug: String,
    tenant_name: String,
    contact_email: Option<String>,
    modules_subscribed: Option<Vec<String>>,
    is_active: bool,
    finance_schema: Option<String>,
    operations_schema: Option<String>,
    inventory_schema: Option<String>,
    hrms_schema: Option<String>,
    modified_at: Option<DateTime<Utc>>,
}

impl From<TenantRow> for TenantRecord {
    fn from(row: TenantRow) -> Self {
        TenantRecord {
            tenant_id: row.tenant_id,
            slug: row.tenant_slug,
            display_name: row.tenant_name,
            contact_email: row.contact_email,
            is_active: row.is_active,
            modules_subscribed: row.modules_subscribed.unwrap_or_default(),
            schemas: ModuleSchemas {
                finance: row.finance_schema,
                operations: row.operations_schema,
                inventory: row.inventory_schema,
                hrms: row.hrms_schema,
            },
            modified_at: row.modified_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    tenant_id: Uuid,
    module_name: String,
    action: String,
    schema_name: String,
    status: String,
    error_message: Option<String>,
    provisioned_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for ProvisioningAuditEntry {
    type Error = sqlx::Error;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AuditStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        Ok(ProvisioningAuditEntry {
            id: row.id,
            tenant_id: row.tenant_id,
            module_name: row.module_name,
            action: row.action,
            schema_name: row.schema_name,
            status,
            error_message: row.error_message,
            actor: row.provisioned_by,
            created_at: row.created_at,
        })
    }
}

const AUDIT_COLUMNS: &str =
    "id, tenant_id, module_name, action, schema_name, status, error_message, provisioned_by, created_at";

#[async_trait]
impl RegistryStore for PgRegistry {
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT tenant_id, tenant_slug, tenant_name, contact_email, modules_subscribed, is_active,
                   finance_schema, operations_schema, inventory_schema, hrms_schema, modified_at
            FROM {}
            WHERE tenant_id = $1
            "#,
            self.tenants_table
        );
        tracing::debug!(%tenant_id, "query tenant registry");
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(TenantRecord::from))
    }

    async fn is_active(&self, tenant_id: Uuid) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE tenant_id = $1 AND is_active = true)",
            self.tenants_table
        );
        let exists: (bool,) = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0)
    }

    async fn has_module(&self, tenant_id: Uuid, module: ServiceModule) -> Result<bool, sqlx::Error> {
        let sql = format!("SELECT {}($1, $2)", self.has_module_fn);
        let has: (Option<bool>,) = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(module.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(has.0.unwrap_or(false))
    }

    async fn set_module_schema(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
        schema: &str,
    ) -> Result<u64, sqlx::Error> {
        let sql = format!(
            "UPDATE {} SET {} = $2, modified_at = now() WHERE tenant_id = $1",
            self.tenants_table,
            module.schema_column()
        );
        let result = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(schema)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<i64, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO {} (tenant_id, module_name, action, schema_name, status, provisioned_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
            self.log_table
        );
        let id: (i64,) = sqlx::query_as(&sql)
            .bind(entry.tenant_id)
            .bind(entry.module.as_str())
            .bind(PROVISION_ACTION)
            .bind(&entry.schema_name)
            .bind(AuditStatus::Pending.as_str())
            .bind(&entry.actor)
            .fetch_one(&self.pool)
            .await?;
        Ok(id.0)
    }

    async fn update_audit(
        &self,
        target: &AuditTarget,
        status: AuditStatus,
        error: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = match target {
            AuditTarget::Entry(id) => {
                let sql = format!(
                    "UPDATE {} SET status = $2, error_message = COALESCE($3, error_message) WHERE id = $1",
                    self.log_table
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(status.as_str())
                    .bind(error)
                    .execute(&self.pool)
                    .await?
            }
            AuditTarget::Pending { tenant_id, module } => {
                let sql = format!(
                    r#"
                    UPDATE {} SET status = $3, error_message = COALESCE($4, error_message)
                    WHERE tenant_id = $1 AND module_name = $2 AND action = $5 AND status = $6
                    "#,
                    self.log_table
                );
                sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(module.as_str())
                    .bind(status.as_str())
                    .bind(error)
                    .bind(PROVISION_ACTION)
                    .bind(AuditStatus::Pending.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn latest_audit(
        &self,
        tenant_id: Uuid,
        module: ServiceModule,
    ) -> Result<Option<ProvisioningAuditEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM {}
            WHERE tenant_id = $1 AND module_name = $2 AND action = $3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            AUDIT_COLUMNS, self.log_table
        );
        let row: Option<AuditRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(module.as_str())
            .bind(PROVISION_ACTION)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProvisioningAuditEntry::try_from).transpose()
    }

    async fn stalled_audits(
        &self,
        module: ServiceModule,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningAuditEntry>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {cols} FROM (
                SELECT DISTINCT ON (tenant_id) {cols}
                FROM {log}
                WHERE module_name = $1 AND action = $2
                ORDER BY tenant_id, created_at DESC, id DESC
            ) latest
            WHERE status = $3 AND created_at < $4
            ORDER BY created_at
            "#,
            cols = AUDIT_COLUMNS,
            log = self.log_table
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(module.as_str())
            .bind(PROVISION_ACTION)
            .bind(AuditStatus::SchemaCreated.as_str())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ProvisioningAuditEntry::try_from).collect()
    }
}
