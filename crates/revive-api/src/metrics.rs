//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "revive_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "revive_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "revive_http_requests_in_flight";

    // Stage metrics
    pub const ANALYSES_TOTAL: &str = "revive_analyses_total";
    pub const RESTORATION_DURATION_SECONDS: &str = "revive_restoration_duration_seconds";
    pub const TRANSLATIONS_TOTAL: &str = "revive_translations_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "revive_rate_limit_hits_total";
    pub const QUOTA_REJECTIONS_TOTAL: &str = "revive_quota_rejections_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a completed analysis.
pub fn record_analysis(outcome: &str) {
    counter!(names::ANALYSES_TOTAL, &[("outcome", outcome.to_string())]).increment(1);
}

/// Record restoration latency by strategy.
pub fn record_restoration_duration(strategy: &str, duration_secs: f64) {
    histogram!(
        names::RESTORATION_DURATION_SECONDS,
        &[("strategy", strategy.to_string())]
    )
    .record(duration_secs);
}

/// Record a translation request.
pub fn record_translation(target_language: &str) {
    counter!(
        names::TRANSLATIONS_TOTAL,
        &[("language", target_language.to_string())]
    )
    .increment(1);
}

/// Record a per-IP rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    counter!(
        names::RATE_LIMIT_HITS_TOTAL,
        &[("endpoint", endpoint.to_string())]
    )
    .increment(1);
}

/// Record a quota rejection.
pub fn record_quota_rejection() {
    counter!(names::QUOTA_REJECTIONS_TOTAL).increment(1);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
