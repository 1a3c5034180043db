//! Cache monitoring endpoints

use axum::{Json, extract::Request, http::StatusCode, response::IntoResponse};
use rounds_core::{CacheReport, Context, FieldRule, ObjectSchema};
use serde::{Deserialize, Serialize};

use crate::pipeline::HandlerResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    prefix: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateResponse {
    prefix: String,
    removed: usize,
}

pub fn invalidate_schema() -> ObjectSchema {
    ObjectSchema::new().field("prefix", FieldRule::string().required().max_len(256))
}

/// GET /admin/cache/stats - Cache statistics with an efficiency assessment
pub async fn cache_stats(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let report = CacheReport::from_stats(state.cache.stats());
    tracing::debug!(
        subject = ctx.subject_id().unwrap_or_default(),
        hit_rate = report.stats.hit_rate,
        "Cache report requested"
    );
    Ok(Json(report).into_response())
}

/// POST /admin/cache/invalidate - Drop every entry whose key starts with `prefix`
///
/// An empty prefix clears the whole cache.
pub async fn invalidate(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let body: InvalidateRequest = ctx.body_as()?;

    let removed = if body.prefix.is_empty() {
        let removed = state.cache.stats().size;
        state.cache.clear();
        removed
    } else {
        state.cache.invalidate_prefix(&body.prefix)
    };

    tracing::info!(
        target: "audit",
        subject = ctx.subject_id().unwrap_or_default(),
        prefix = %body.prefix,
        removed,
        "Cache invalidated"
    );

    Ok((
        StatusCode::OK,
        Json(InvalidateResponse {
            prefix: body.prefix,
            removed,
        }),
    )
        .into_response())
}
