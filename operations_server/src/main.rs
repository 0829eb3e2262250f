//! Operations service: opens both pools, installs the provisioning procedure, starts the
//! reconciler and serves the HTTP API until SIGINT/SIGTERM.
//!
//! Run from repo root: `cargo run -p operations-server`

use operations_tenancy::auth::{RejectAll, SharedSecretAuthenticator};
use operations_tenancy::{
    app_router, load_from_env, AppState, Authenticator, Installer, PgOperations, PgRegistry, Pools,
    ProvisioningCoordinator, Reconciler, SchemaResolver, ServiceConfig, ServiceModule, TenantAdmin,
    TenantGate, TenantSessions,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn init_tracing(config: &ServiceConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("operations_tenancy=info,operations_server=info"));
    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = load_from_env()?;
    init_tracing(&config);

    let module = ServiceModule::from_str(&config.service_name)?;
    let pools = Pools::open(&config).await?;

    let installer = Installer::with_default_candidates(config.provision_script_path.clone());
    if let Err(e) = installer.ensure_installed(&pools.operations).await {
        pools.close().await;
        return Err(e.into());
    }

    let registry = Arc::new(PgRegistry::new(pools.registry.clone(), &config.registry_schema));
    let operations = Arc::new(PgOperations::new(pools.operations.clone(), module));
    let resolver = SchemaResolver::new(registry.clone());
    let sessions = Arc::new(TenantSessions::new(pools.operations.clone(), resolver, module));
    let coordinator = Arc::new(ProvisioningCoordinator::new(
        registry.clone(),
        operations.clone(),
        module,
        config.db_owner_role.clone(),
    ));

    let internal_secret: Option<Arc<str>> = config.internal_secret.as_deref().map(Arc::from);
    let authenticator: Arc<dyn Authenticator> = match &internal_secret {
        Some(secret) => Arc::new(SharedSecretAuthenticator::new(secret.clone())),
        None => {
            tracing::warn!("FREGO_INTERNAL_SECRET not set; tenant API and provisioning endpoints are disabled");
            Arc::new(RejectAll)
        }
    };

    let state = AppState {
        pools: pools.clone(),
        sessions,
        admin: TenantAdmin {
            coordinator,
            internal_secret,
        },
        tenant_gate: TenantGate::new(registry.clone(), config.default_tenant),
        authenticator,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(registry, operations, module, config.reconcile_stale_after)
        .spawn(config.reconcile_interval, shutdown_rx);

    let app = app_router(state, &config);
    let listener = TcpListener::bind(config.http_address.as_str()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        module = %module,
        environment = %config.environment,
        "operations service listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(delay = ?config.graceful_delay, "shutting down gracefully");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(config.graceful_delay).await;
    if let Err(e) = reconciler.await {
        tracing::warn!(error = %e, "reconciler task ended abnormally");
    }
    pools.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
