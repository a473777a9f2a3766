//! Literature search, DOI metadata and similarity scoring.
//!
//! All three go through the compute cache, so repeated queries are served
//! without calling the provider again.

use axum::{extract::State, routing::post, Json, Router};
use folio_core::RateLimitAction;
use folio_llm::{BibliographicRecord, LiteratureRecord, SimilarityReport, SourceText};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SEARCH_LIMIT;
use crate::error::{ApiError, ApiResult};
use crate::extractors::ClientIp;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<LiteratureRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataRequest {
    pub doi: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityRequest {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<SourceText>,
}

async fn throttle(state: &AppState, client: &ClientIp) -> ApiResult<()> {
    state
        .rate_limiter
        .enforce(RateLimitAction::Research, &client.as_identifier())
        .await?;
    Ok(())
}

/// POST /api/v1/research/search
async fn search(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    throttle(&state, &client).await?;
    let limit = req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let results = state.providers.search_literature(&req.query, limit).await?;
    Ok(Json(SearchResponse { results }))
}

/// POST /api/v1/research/metadata
async fn metadata(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<MetadataRequest>,
) -> ApiResult<Json<BibliographicRecord>> {
    throttle(&state, &client).await?;
    state
        .providers
        .resolve_doi(&req.doi)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No metadata found for this DOI"))
}

/// POST /api/v1/research/similarity
async fn similarity(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<SimilarityRequest>,
) -> ApiResult<Json<SimilarityReport>> {
    throttle(&state, &client).await?;
    let report = state
        .providers
        .score_similarity(&req.text, &req.sources)
        .await?;
    Ok(Json(report))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/search", post(search))
        .route("/metadata", post(metadata))
        .route("/similarity", post(similarity))
}
