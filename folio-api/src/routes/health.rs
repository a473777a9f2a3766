//! Health check endpoints. No throttling state is consulted.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use folio_llm::CachedProviders;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Which optional providers are registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub text_generation: bool,
    pub literature_search: bool,
    pub metadata: bool,
    pub similarity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub providers: ProviderHealth,
    pub cache_hit_rate: f64,
}

/// GET /health/ping
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health
///
/// Degraded when no text generator is registered; the service still
/// answers everything else.
pub async fn health(
    State(providers): State<CachedProviders>,
    State(start_time): State<Instant>,
) -> Json<HealthResponse> {
    let registry = providers.registry();
    let provider_health = ProviderHealth {
        text_generation: registry.text_generator().is_ok(),
        literature_search: registry.literature_search().is_ok(),
        metadata: registry.metadata_resolver().is_ok(),
        similarity: registry.similarity_scorer().is_ok(),
    };
    let status = if provider_health.text_generation {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        providers: provider_health,
        cache_hit_rate: providers.cache().stats().hit_rate(),
    })
}
