//! Prometheus scrape endpoint

use axum::{Extension, http::header, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Exposition format served to scrapers
const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// GET /metrics - HTTP, rate limit and cache counters in Prometheus text format
pub async fn get(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], handle.render())
}
