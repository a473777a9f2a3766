//! REST API Routes Module
//!
//! Route modules nest under `/api/v1`. Health and metrics sit at the root.
//!
//! Layers, outermost first: HTTP tracing, body size limit, observability,
//! per-IP throttle.

pub mod auth;
pub mod documents;
pub mod health;
pub mod research;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::constants::MAX_REQUEST_BODY_BYTES;
use crate::middleware::{ip_rate_limit_middleware, IpRateLimitState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let throttle = IpRateLimitState::new(&state.config);

    let api_routes = Router::new()
        .nest("/auth", auth::create_router())
        .nest("/documents", documents::create_router())
        .nest("/research", research::create_router());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health::health))
        .route("/health/ping", get(health::ping))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
                .layer(from_fn(observability_middleware))
                .layer(from_fn_with_state(throttle, ip_rate_limit_middleware)),
        )
        .with_state(state)
}
