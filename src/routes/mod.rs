pub mod api;
pub mod common;
pub mod tenant;

pub use api::{api_routes, tenant_scoped, API_PREFIX};
pub use common::{common_routes, common_routes_with_ready};
pub use tenant::tenant_routes;

use crate::config::ServiceConfig;
use crate::extractors::TENANT_ID_HEADER;
use crate::handlers::SECRET_HEADER;
use crate::state::AppState;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Full service router: common, internal provisioning and tenant-scoped API routes,
/// wrapped in the service-wide layers.
pub fn app_router(state: AppState, config: &ServiceConfig) -> Router {
    let routes = Router::new()
        .merge(common_routes_with_ready(state.pools.clone()))
        .merge(tenant_routes(state.admin.clone()))
        .merge(api_routes(state));
    with_service_layers(routes, config.request_timeout, &config.allowed_origins)
}

/// Outermost first: request id, tracing (span carries the id), id echoed on the response,
/// panic recovery, CORS, then the per-request timeout.
pub fn with_service_layers(router: Router, request_timeout: Duration, allowed_origins: &[String]) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(CatchPanicLayer::new())
            .layer(cors_layer(allowed_origins))
            .layer(TimeoutLayer::new(request_timeout)),
    )
}

/// Browser access for the configured origins, with credentials. Origins that are not valid
/// header values are skipped.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static(TENANT_ID_HEADER_LOWER),
            HeaderName::from_static(SECRET_HEADER_LOWER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

// `HeaderName::from_static` only accepts lowercase names.
const TENANT_ID_HEADER_LOWER: &str = "x-tenant-id";
const SECRET_HEADER_LOWER: &str = "secret";
