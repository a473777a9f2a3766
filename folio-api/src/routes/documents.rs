//! Document version history and section generation.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use folio_core::{
    BatchResult, DocumentId, DocumentVersion, FolioError, GenerationTask, NotFoundError,
    RateLimitAction, SectionId, VersionSummary,
};
use folio_storage::VersionStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extractors::ClientIp;
use crate::services::BatchOptions;
use crate::state::AppState;
use crate::telemetry::metrics;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AppendVersionRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionListResponse {
    pub document_id: DocumentId,
    /// Newest first.
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionRequest {
    pub section_id: SectionId,
    pub title: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub sections: Vec<SectionRequest>,
    #[serde(flatten)]
    pub options: BatchOptions,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/v1/documents/:document_id/versions
async fn list_versions(
    State(versions): State<Arc<VersionStore>>,
    Path(document_id): Path<DocumentId>,
) -> ApiResult<Json<VersionListResponse>> {
    let listed = versions.list_versions(document_id).await?;
    Ok(Json(VersionListResponse {
        document_id,
        versions: listed.iter().map(DocumentVersion::summary).collect(),
    }))
}

/// POST /api/v1/documents/:document_id/versions
async fn append_version(
    State(versions): State<Arc<VersionStore>>,
    Path(document_id): Path<DocumentId>,
    Json(req): Json<AppendVersionRequest>,
) -> ApiResult<(StatusCode, Json<VersionSummary>)> {
    let appended = versions.append_version(document_id, req.content).await;
    if let Some(metrics) = metrics() {
        metrics.record_version_append(appended.is_ok());
    }
    Ok((StatusCode::CREATED, Json(appended?.summary())))
}

/// GET /api/v1/documents/:document_id/versions/latest
async fn latest_version(
    State(versions): State<Arc<VersionStore>>,
    Path(document_id): Path<DocumentId>,
) -> ApiResult<Json<DocumentVersion>> {
    let latest = versions
        .latest(document_id)
        .await?
        .ok_or_else(|| FolioError::from(NotFoundError::Document { document_id }))?;
    Ok(Json(latest))
}

/// GET /api/v1/documents/:document_id/versions/:version_number
async fn get_version(
    State(versions): State<Arc<VersionStore>>,
    Path((document_id, version_number)): Path<(DocumentId, u32)>,
) -> ApiResult<Json<DocumentVersion>> {
    Ok(Json(versions.get_version(document_id, version_number).await?))
}

/// POST /api/v1/documents/:document_id/generate
///
/// Per-section failures are reported in the body with status 200 unless
/// `require_all` is set.
async fn generate(
    State(state): State<AppState>,
    client: ClientIp,
    Path(document_id): Path<DocumentId>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<Json<BatchResult>> {
    state
        .rate_limiter
        .enforce(RateLimitAction::Generation, &client.as_identifier())
        .await?;

    let tasks = req
        .sections
        .into_iter()
        .map(|section| GenerationTask {
            document_id,
            section_id: section.section_id,
            title: section.title,
            context: section.context,
        })
        .collect();
    let result = state.batch.run_batch_with(tasks, req.options).await?;
    Ok(Json(result))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/:document_id/versions",
            get(list_versions).post(append_version),
        )
        .route("/:document_id/versions/latest", get(latest_version))
        .route("/:document_id/versions/:version_number", get(get_version))
        .route("/:document_id/generate", post(generate))
}
