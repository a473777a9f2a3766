//! FOLIO API Server Entry Point
//!
//! Loads configuration from the environment, wires the in-memory backends
//! and serves the Axum router until Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use folio_api::{
    constants::EXPIRY_PURGE_INTERVAL_SECS,
    create_router,
    telemetry::{init_tracing, TelemetryConfig},
    ApiConfig, ApiError, ApiResult, AppState,
};
use folio_llm::ProviderRegistry;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let addr = api_config.bind_addr()?;

    let state = AppState::builder(api_config)
        .providers(provider_registry())
        .build()?;

    spawn_purge_job(state.clone());
    let app = create_router(state);

    tracing::info!(%addr, "Starting FOLIO API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

#[cfg(feature = "dev")]
fn provider_registry() -> ProviderRegistry {
    use std::sync::Arc;

    use folio_llm::{MockLiteratureSearch, MockMetadataResolver, MockTextGenerator};

    tracing::warn!("Registering mock providers (dev feature)");
    let mut registry = ProviderRegistry::with_default_scorer();
    registry.register_text_generator(Arc::new(MockTextGenerator::new()));
    registry.register_literature_search(Arc::new(MockLiteratureSearch));
    registry.register_metadata_resolver(Arc::new(MockMetadataResolver::new()));
    registry
}

#[cfg(not(feature = "dev"))]
fn provider_registry() -> ProviderRegistry {
    ProviderRegistry::with_default_scorer()
}

fn spawn_purge_job(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(EXPIRY_PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = state.purge_expired().await {
                tracing::warn!(error = %e, "Expiry purge failed");
            }
        }
    });
}
