//! Prometheus Metrics Definitions
//!
//! All signwall metrics with their labels. Scraped from `/metrics`.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Renderer latency buckets (seconds). Renders take hundreds of milliseconds
/// to several seconds.
const RENDER_LATENCY_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<SignwallMetrics>> = Lazy::new(SignwallMetrics::new);

/// The registered metrics, or `None` if registration failed at startup.
pub fn metrics() -> Option<&'static SignwallMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all signwall metrics.
#[derive(Clone)]
pub struct SignwallMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Banner cache lookups - labels: outcome (fresh/stale/miss/error)
    pub artifact_cache_lookups_total: CounterVec,

    /// Renderer invocations - labels: status (success/error)
    pub renderer_calls_total: CounterVec,

    /// Renderer latency histogram - labels: status
    pub renderer_duration_seconds: HistogramVec,

    /// Sign attempts - labels: outcome
    pub signatures_total: CounterVec,

    /// Notification deliveries - labels: sink, status (success/failure)
    pub notifications_total: CounterVec,

    /// Rate limiter rejections - labels: limiter (global/sign)
    pub rate_limited_total: CounterVec,
}

impl SignwallMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "signwall_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "signwall_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            artifact_cache_lookups_total: register_counter_vec!(
                "signwall_artifact_cache_lookups_total",
                "Banner cache lookups by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register artifact_cache_lookups_total: {}", e)))?,

            renderer_calls_total: register_counter_vec!(
                "signwall_renderer_calls_total",
                "Total banner renderer invocations",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register renderer_calls_total: {}", e)))?,

            renderer_duration_seconds: register_histogram_vec!(
                "signwall_renderer_duration_seconds",
                "Banner renderer latency in seconds",
                &["status"],
                RENDER_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register renderer_duration_seconds: {}", e)))?,

            signatures_total: register_counter_vec!(
                "signwall_signatures_total",
                "Sign attempts by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register signatures_total: {}", e)))?,

            notifications_total: register_counter_vec!(
                "signwall_notifications_total",
                "Post-signature notification deliveries",
                &["sink", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register notifications_total: {}", e)))?,

            rate_limited_total: register_counter_vec!(
                "signwall_rate_limited_total",
                "Requests rejected by a rate limiter",
                &["limiter"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limited_total: {}", e)))?,
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

    /// Record a banner cache lookup outcome.
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.artifact_cache_lookups_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a renderer call.
    pub fn record_render(&self, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.renderer_calls_total.with_label_values(&[status]).inc();
        self.renderer_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
    }

    /// Record a sign attempt outcome (signed, already_signed, captcha_failed, ...).
    pub fn record_signature(&self, outcome: &str) {
        self.signatures_total.with_label_values(&[outcome]).inc();
    }

    /// Record a notification delivery.
    pub fn record_notification(&self, sink: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.notifications_total
            .with_label_values(&[sink, status])
            .inc();
    }

    pub fn record_rate_limited(&self, limiter: &str) {
        self.rate_limited_total.with_label_values(&[limiter]).inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
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
