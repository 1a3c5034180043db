//! Rate limiting layer

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    response::IntoResponse,
};
use futures_util::future::BoxFuture;
use rounds_core::{Context, Policy, RateLimitDecision, RateLimitKey, RateLimiter};

use crate::error::AppError;
use crate::middleware::metrics::record_rate_limit;
use crate::pipeline::{Handler, HandlerResult, Middleware};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Stamp quota headers; `Retry-After` is added only for rejections
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at_secs()));
    if !decision.admitted {
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from(decision.retry_after_secs),
        );
    }
}

/// Admission control keyed by subject id, falling back to client address
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    policy: Policy,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, policy: Policy) -> Self {
        Self { limiter, policy }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(RateLimitHandler {
            limiter: self.limiter.clone(),
            policy: self.policy,
            next,
        })
    }
}

struct RateLimitHandler {
    limiter: Arc<RateLimiter>,
    policy: Policy,
    next: Arc<dyn Handler>,
}

impl Handler for RateLimitHandler {
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, HandlerResult> {
        let key = RateLimitKey::for_caller(ctx.subject_id(), ctx.client_addr());
        let decision = self.limiter.check(self.policy, &key);
        record_rate_limit(self.policy, &decision);

        if !decision.admitted {
            tracing::warn!(
                policy = %self.policy,
                key = %key,
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
            return Box::pin(async move { Err(AppError::RateLimited(decision)) });
        }

        // The slot is spent, so inner rejections report the quota too
        let next = self.next.clone();
        Box::pin(async move {
            let mut response = match next.call(request, ctx).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };
            apply_rate_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}
