//! Prometheus metrics collection
//!
//! Records `http_requests_total` (counter) and `http_request_duration_seconds`
//! (histogram) for every request, plus admission and cache counters emitted
//! by the pipeline layers.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use rounds_core::{Policy, RateLimitDecision};
use std::time::Instant;

/// Route template for labels, so per-resource paths share one series
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

/// Middleware that records request count and duration metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = route_label(&request);

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();

    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

/// Count one admission decision
pub fn record_rate_limit(policy: Policy, decision: &RateLimitDecision) {
    let outcome = if decision.admitted {
        "admitted"
    } else {
        "rejected"
    };
    metrics::counter!(
        "rate_limit_decisions_total",
        "policy" => policy.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count one response cache lookup
pub fn record_cache_lookup(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("cache_lookups_total", "outcome" => outcome).increment(1);
}
