//! Axum middleware recording request metrics.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

use super::metrics::metrics;

static UUID_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .ok()
});

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Replace ids in a raw path with placeholders to keep label cardinality low.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Some(uuid) = UUID_SEGMENT.as_ref() {
        result = uuid.replace_all(&result, "{id}").into_owned();
    }
    if let Some(numeric) = NUMERIC_SEGMENT.as_ref() {
        result = numeric.replace_all(&result, "/{id}$1").into_owned();
    }
    result
}

/// Record method, route and status of every request.
///
/// Uses the matched route template when available and falls back to a
/// normalized raw path.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| normalize_path(request.uri().path()));

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();
    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::debug!(
        method = %method,
        route = %route,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/documents/550e8400-e29b-41d4-a716-446655440000/versions";
        assert_eq!(normalize_path(path), "/api/v1/documents/{id}/versions");
    }

    #[test]
    fn test_normalize_path_version_number() {
        let path = "/api/v1/documents/550e8400-e29b-41d4-a716-446655440000/versions/12";
        assert_eq!(normalize_path(path), "/api/v1/documents/{id}/versions/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/health"), "/health");
    }
}
