//! Common routes: health, readiness, version.

use crate::db::Pools;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Both clusters must answer; the body names the first one that did not.
async fn ready(State(pools): State<Pools>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    if let Err((pool, e)) = pools.ping().await {
        tracing::warn!(pool, error = %e, "readiness probe failed");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: Some(pool),
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        database: None,
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Common routes plus GET /ready, which pings both pools.
pub fn common_routes_with_ready(pools: Pools) -> Router {
    common_routes().merge(Router::new().route("/ready", get(ready)).with_state(pools))
}
