//! Tenant-scoped sessions on the operations database.
//!
//! `acquire` resolves the tenant schema, takes a connection from the pool and runs the
//! search-path statement on it before anyone else can use it. The returned guard hands the
//! connection back when released or dropped, including on early return, panic or cancellation.

use crate::error::{SessionError, TenantError};
use crate::sql::search_path_statement;
use crate::tenant::{SchemaResolver, ServiceModule};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// A connection that can run a statement with no parameters.
#[async_trait]
pub trait SessionConnection: Send {
    async fn execute_statement(&mut self, sql: &str) -> Result<(), sqlx::Error>;
}

/// Where session connections come from. Implemented by `PgPool`; capacity and blocking on
/// exhaustion are the pool's concern.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Conn: SessionConnection;

    async fn acquire_connection(&self) -> Result<Self::Conn, sqlx::Error>;
}

#[async_trait]
impl SessionConnection for PoolConnection<Postgres> {
    async fn execute_statement(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        // Simple query protocol: nothing is prepared or cached per schema name.
        sqlx::Executor::execute(&mut **self, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionSource for PgPool {
    type Conn = PoolConnection<Postgres>;

    async fn acquire_connection(&self) -> Result<Self::Conn, sqlx::Error> {
        self.acquire().await
    }
}

/// Hands out sessions for one module on one connection source.
pub struct TenantSessions<S = PgPool> {
    source: S,
    resolver: SchemaResolver,
    module: ServiceModule,
}

impl<S: ConnectionSource> TenantSessions<S> {
    pub fn new(source: S, resolver: SchemaResolver, module: ServiceModule) -> Self {
        TenantSessions {
            source,
            resolver,
            module,
        }
    }

    pub fn module(&self) -> ServiceModule {
        self.module
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Resolve, acquire, switch search path. If the switch fails the connection is returned before
    /// the error propagates.
    pub async fn acquire(&self, tenant_id: Uuid) -> Result<TenantSession<S::Conn>, SessionError> {
        let schema = self.resolver.resolve(tenant_id, self.module).await?;

        let mut conn = self
            .source
            .acquire_connection()
            .await
            .map_err(|source| SessionError::Acquire { tenant_id, source })?;

        if let Err(source) = conn.execute_statement(&search_path_statement(&schema)).await {
            drop(conn);
            tracing::warn!(%tenant_id, schema = %schema, error = %source, "set search path failed");
            return Err(SessionError::SearchPath {
                tenant_id,
                schema,
                source,
            });
        }

        tracing::debug!(%tenant_id, schema = %schema, module = %self.module, "tenant session acquired");
        Ok(TenantSession {
            conn,
            tenant_id,
            schema,
        })
    }

    /// Fails with `AccessDenied` unless the registry says the tenant has this module.
    pub async fn verify_access(&self, tenant_id: Uuid) -> Result<(), TenantError> {
        if self.resolver.verify_access(tenant_id, self.module.as_str()).await? {
            Ok(())
        } else {
            Err(TenantError::AccessDenied {
                tenant_id,
                module: self.module.to_string(),
            })
        }
    }
}

/// A connection bound to one tenant schema. Owned by a single request; never shared across tenants.
/// Derefs to the underlying connection for running statements.
pub struct TenantSession<C> {
    conn: C,
    tenant_id: Uuid,
    schema: String,
}

impl<C> TenantSession<C> {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Return the connection to the pool. Consuming `self` makes a second release impossible.
    pub fn release(self) {
        drop(self);
    }
}

impl TenantSession<PoolConnection<Postgres>> {
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Transaction on the session connection; the tenant search path stays in effect inside it.
    pub async fn begin(&mut self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        use sqlx::Connection;
        self.connection().begin().await
    }
}

impl<C> std::fmt::Debug for TenantSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantSession")
            .field("tenant_id", &self.tenant_id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl<C> Deref for TenantSession<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for TenantSession<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C> Drop for TenantSession<C> {
    fn drop(&mut self) {
        tracing::trace!(tenant_id = %self.tenant_id, schema = %self.schema, "tenant session released");
    }
}
