//! Prometheus Metrics Definitions
//!
//! Defines all FOLIO metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Batch task latency buckets (seconds); generation is slow.
const TASK_LATENCY_BUCKETS: &[f64] = &[0.05, 0.25, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<FolioMetrics>> = Lazy::new(FolioMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static FolioMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all FOLIO metrics.
#[derive(Clone)]
pub struct FolioMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Rate-limit decisions - labels: action, outcome (allowed/denied)
    pub rate_limit_decisions_total: CounterVec,

    /// Lockout events - labels: event (failure/locked/cleared/rejected)
    pub lockout_events_total: CounterVec,

    /// Token lifecycle - labels: purpose, event (issued/consumed/rejected)
    pub token_events_total: CounterVec,

    /// Version appends - labels: status (success/error)
    pub version_appends_total: CounterVec,

    /// Batch task outcomes - labels: status (success/error)
    pub batch_tasks_total: CounterVec,

    /// Batch task duration including retries - labels: status
    pub batch_task_duration_seconds: HistogramVec,

    /// Compute cache counters sampled at scrape time - labels: counter
    pub compute_cache: GaugeVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl FolioMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "folio_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "folio_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            rate_limit_decisions_total: register_counter_vec!(
                "folio_rate_limit_decisions_total",
                "Rate limiter decisions",
                &["action", "outcome"]
            )
            .map_err(|e| registration_error("rate_limit_decisions_total", e))?,

            lockout_events_total: register_counter_vec!(
                "folio_lockout_events_total",
                "Account lockout events",
                &["event"]
            )
            .map_err(|e| registration_error("lockout_events_total", e))?,

            token_events_total: register_counter_vec!(
                "folio_token_events_total",
                "Security token lifecycle events",
                &["purpose", "event"]
            )
            .map_err(|e| registration_error("token_events_total", e))?,

            version_appends_total: register_counter_vec!(
                "folio_version_appends_total",
                "Document version appends",
                &["status"]
            )
            .map_err(|e| registration_error("version_appends_total", e))?,

            batch_tasks_total: register_counter_vec!(
                "folio_batch_tasks_total",
                "Batch generation task outcomes",
                &["status"]
            )
            .map_err(|e| registration_error("batch_tasks_total", e))?,

            batch_task_duration_seconds: register_histogram_vec!(
                "folio_batch_task_duration_seconds",
                "Batch task duration in seconds, including retries",
                &["status"],
                TASK_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("batch_task_duration_seconds", e))?,

            compute_cache: register_gauge_vec!(
                "folio_compute_cache",
                "Compute cache counters since startup",
                &["counter"]
            )
            .map_err(|e| registration_error("compute_cache", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_rate_limit(&self, action: &str, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.rate_limit_decisions_total
            .with_label_values(&[action, outcome])
            .inc();
    }

    pub fn record_lockout_event(&self, event: &str) {
        self.lockout_events_total.with_label_values(&[event]).inc();
    }

    pub fn record_token_event(&self, purpose: &str, event: &str) {
        self.token_events_total
            .with_label_values(&[purpose, event])
            .inc();
    }

    pub fn record_version_append(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.version_appends_total.with_label_values(&[status]).inc();
    }

    pub fn record_batch_task(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.batch_tasks_total.with_label_values(&[status]).inc();
        self.batch_task_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    /// Copy cache statistics into the gauges.
    pub fn observe_cache(&self, stats: &folio_storage::CacheStats) {
        let samples = [
            ("hits", stats.hits),
            ("misses", stats.misses),
            ("computes", stats.computes),
            ("compute_failures", stats.compute_failures),
            ("backend_errors", stats.backend_errors),
            ("coalesced", stats.coalesced),
        ];
        for (counter, value) in samples {
            self.compute_cache
                .with_label_values(&[counter])
                .set(value as f64);
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(metrics) = metrics() {
        metrics.observe_cache(&state.providers.cache().stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
