//! Connection pools for the two clusters: the shared tenant registry and the operations database.

use crate::config::{DatabaseSettings, ServiceConfig};
use crate::error::ConnectionError;
use crate::sql::RESET_SEARCH_PATH;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

pub const REGISTRY_POOL: &str = "tenant registry";
pub const OPERATIONS_POOL: &str = "operations";

/// Which cluster a pool talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    Registry,
    Operations,
}

impl PoolKind {
    pub fn name(self) -> &'static str {
        match self {
            PoolKind::Registry => REGISTRY_POOL,
            PoolKind::Operations => OPERATIONS_POOL,
        }
    }

    /// Only tenant sessions change `search_path`, and they only run on the operations pool.
    pub fn resets_search_path(self) -> bool {
        matches!(self, PoolKind::Operations)
    }
}

/// Pool sizing from settings, plus the `RESET search_path` release hook where the pool needs it.
/// A connection whose reset fails is closed instead of being reused.
pub fn pool_options(kind: PoolKind, settings: &DatabaseSettings) -> PgPoolOptions {
    let options = PgPoolOptions::new()
        .max_connections(settings.max_open_conns)
        .min_connections(settings.min_idle_conns)
        .max_lifetime(settings.conn_max_lifetime)
        .acquire_timeout(settings.acquire_timeout);
    if !kind.resets_search_path() {
        return options;
    }
    options.after_release(|conn, _meta| {
        Box::pin(async move {
            sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(RESET_SEARCH_PATH)).await?;
            Ok(true)
        })
    })
}

/// Open a pool and probe it with `SELECT 1`. A failed probe closes the pool and fails startup.
pub async fn open_pool(kind: PoolKind, settings: &DatabaseSettings) -> Result<PgPool, ConnectionError> {
    let name = kind.name();
    let mut options = PgConnectOptions::from_str(&settings.url)
        .map_err(|source| ConnectionError::InvalidUrl { pool: name, source })?;
    if settings.prefer_simple_protocol {
        options = options.statement_cache_capacity(0);
    }

    let pool = pool_options(kind, settings)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Open { pool: name, source })?;

    if let Err(source) = ping(&pool).await {
        pool.close().await;
        return Err(ConnectionError::Ping { pool: name, source });
    }

    tracing::info!(
        pool = name,
        max_conns = settings.max_open_conns,
        min_idle_conns = settings.min_idle_conns,
        simple_protocol = settings.prefer_simple_protocol,
        resets_search_path = kind.resets_search_path(),
        "database connection pool established"
    );
    Ok(pool)
}

pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Both pools, opened at startup and shared (cheaply cloned) by every request.
#[derive(Clone)]
pub struct Pools {
    pub registry: PgPool,
    pub operations: PgPool,
}

impl Pools {
    pub async fn open(config: &ServiceConfig) -> Result<Self, ConnectionError> {
        let registry = open_pool(PoolKind::Registry, &config.tenant_database).await?;
        let operations = match open_pool(PoolKind::Operations, &config.database).await {
            Ok(pool) => pool,
            Err(e) => {
                registry.close().await;
                return Err(e);
            }
        };
        Ok(Pools { registry, operations })
    }

    /// Liveness of both clusters, registry first.
    pub async fn ping(&self) -> Result<(), (&'static str, sqlx::Error)> {
        ping(&self.registry).await.map_err(|e| (REGISTRY_POOL, e))?;
        ping(&self.operations).await.map_err(|e| (OPERATIONS_POOL, e))?;
        Ok(())
    }

    /// Graceful shutdown: waits for borrowed connections to come back, then closes both pools.
    pub async fn close(&self) {
        tokio::join!(self.registry.close(), self.operations.close());
        tracing::info!("database pools closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_the_operations_pool_resets_search_path() {
        assert!(PoolKind::Operations.resets_search_path());
        assert!(!PoolKind::Registry.resets_search_path());
    }

    #[test]
    fn options_follow_settings() {
        let mut settings = DatabaseSettings::new("postgres://localhost/ops");
        settings.max_open_conns = 10;
        settings.min_idle_conns = 2;
        settings.acquire_timeout = Duration::from_secs(3);
        for kind in [PoolKind::Registry, PoolKind::Operations] {
            let options = pool_options(kind, &settings);
            assert_eq!(options.get_max_connections(), 10);
            assert_eq!(options.get_min_connections(), 2);
            assert_eq!(options.get_acquire_timeout(), Duration::from_secs(3));
        }
    }
}
