//! Operations-database side of provisioning: the idempotent schema procedure.

use crate::tenant::ServiceModule;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait SchemaProvisioner: Send + Sync {
    /// Create the tenant schema if missing and (re)apply grants for `owner_role`. Safe to repeat.
    async fn ensure_tenant_schema(
        &self,
        tenant_id: Uuid,
        schema: &str,
        owner_role: &str,
    ) -> Result<(), sqlx::Error>;

    async fn schema_exists(&self, schema: &str) -> Result<bool, sqlx::Error>;
}

pub struct PgOperations {
    pool: PgPool,
    procedure: String,
}

impl PgOperations {
    pub fn new(pool: PgPool, module: ServiceModule) -> Self {
        PgOperations {
            pool,
            procedure: module.provision_procedure(),
        }
    }
}

#[async_trait]
impl SchemaProvisioner for PgOperations {
    /// Runs the procedure inside a transaction holding a per-tenant advisory lock, so concurrent
    /// provisioning of one tenant from several processes is serialized.
    async fn ensure_tenant_schema(
        &self,
        tenant_id: Uuid,
        schema: &str,
        owner_role: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CALL {}($1, $2, $3)", self.procedure))
            .bind(tenant_id)
            .bind(schema)
            .bind(owner_role)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool, sqlx::Error> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
                .bind(schema)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }
}
