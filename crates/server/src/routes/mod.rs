pub mod admin;
pub mod cases;
pub mod health;
pub mod metrics;

use std::future::Future;

use axum::{
    Router,
    extract::Request,
    routing::{get, post},
};
use rounds_core::{Context, Policy};

use crate::middleware::{Authenticate, Log, RateLimit, ValidateBody, ValidateQuery};
use crate::pipeline::{Handler, HandlerResult, Pipeline, handler_fn, into_route};
use crate::state::AppState;

/// Bind `state` to a business handler
fn with_state<F, Fut>(state: AppState, f: F) -> impl Handler
where
    F: Fn(AppState, Request, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler_fn(move |request, ctx| f(state.clone(), request, ctx))
}

fn public(state: &AppState) -> Pipeline {
    Pipeline::new()
        .layer(Log)
        .layer(RateLimit::new(state.limiter.clone(), Policy::Public))
}

fn authenticated(state: &AppState, policy: Policy) -> Pipeline {
    Pipeline::new()
        .layer(Log)
        .layer(Authenticate::new(state.identity.clone()))
        .layer(RateLimit::new(state.limiter.clone(), policy))
}

/// Build clinical case routes
pub fn case_routes(state: &AppState) -> Router {
    let list = public(state)
        .layer(ValidateQuery::new(cases::list_query_schema()))
        .handler(with_state(state.clone(), cases::list));
    let read = public(state).handler(with_state(state.clone(), cases::read));
    let create = authenticated(state, Policy::Write)
        .layer(ValidateBody::new(cases::new_case_schema()))
        .handler(with_state(state.clone(), cases::create));
    let attempt = authenticated(state, Policy::Write)
        .layer(ValidateBody::new(cases::attempt_schema()))
        .handler(with_state(state.clone(), cases::submit_attempt));

    Router::new()
        .route("/cases", get(into_route(list)).post(into_route(create)))
        .route("/cases/{id}", get(into_route(read)))
        .route("/cases/{id}/attempts", post(into_route(attempt)))
}

/// Build cache monitoring routes
pub fn admin_routes(state: &AppState) -> Router {
    let stats = authenticated(state, Policy::Authenticated)
        .handler(with_state(state.clone(), admin::cache_stats));
    let invalidate = authenticated(state, Policy::Sensitive)
        .layer(ValidateBody::new(admin::invalidate_schema()))
        .handler(with_state(state.clone(), admin::invalidate));

    Router::new()
        .route("/cache/stats", get(into_route(stats)))
        .route("/cache/invalidate", post(into_route(invalidate)))
}
