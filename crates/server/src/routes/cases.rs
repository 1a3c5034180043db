//! Clinical case HTTP handlers

use axum::{
    Json,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use rounds_core::{CacheKey, Context, FieldRule, ObjectSchema};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{get_json, set_json};
use crate::db::{CaseFilter, CasePage, ClinicalCase, Difficulty, NewCase, normalize_specialty};
use crate::error::AppError;
use crate::pipeline::HandlerResult;
use crate::state::AppState;

/// Response header reporting whether the body came from the cache
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Resource names used in cache keys
const LIST_RESOURCE: &str = "cases";
const CASE_RESOURCE: &str = "case";

pub const MAX_PAGE_SIZE: i64 = 100;

pub fn list_query_schema() -> ObjectSchema {
    ObjectSchema::new()
        .coerce_strings()
        .field("specialty", FieldRule::string().min_len(1).max_len(64))
        .field("difficulty", FieldRule::one_of(&Difficulty::NAMES))
        .field(
            "page",
            FieldRule::integer().min(1).max(i64::from(u32::MAX)).default(1),
        )
        .field(
            "limit",
            FieldRule::integer().min(1).max(MAX_PAGE_SIZE).default(20),
        )
}

pub fn new_case_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field("title", FieldRule::string().required().min_len(3).max_len(200))
        .field("specialty", FieldRule::string().required().min_len(1).max_len(64))
        .field("difficulty", FieldRule::one_of(&Difficulty::NAMES).required())
        .field(
            "presentation",
            FieldRule::string().required().min_len(1).max_len(4000),
        )
}

pub fn attempt_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field("caseId", FieldRule::string().required().min_len(1))
        .field("answer", FieldRule::string().required().min_len(1).max_len(2000))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptRequest {
    case_id: String,
    answer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptResponse {
    id: Uuid,
    case_id: Uuid,
    submitted_at: chrono::DateTime<chrono::Utc>,
}

fn list_key(filter: &CaseFilter) -> String {
    CacheKey::new(LIST_RESOURCE)
        .param_opt(
            "specialty",
            filter.specialty.as_deref().map(normalize_specialty),
        )
        .param_opt("difficulty", filter.difficulty.map(|d| d.as_str()))
        .param("page", filter.page)
        .param("limit", filter.limit)
        .to_string()
}

fn case_key(id: Uuid) -> String {
    CacheKey::new(CASE_RESOURCE).param("id", id).to_string()
}

fn with_cache_status(mut response: Response, hit: bool) -> Response {
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
    );
    response
}

/// Parse the `{id}` route parameter
fn case_id(ctx: &Context) -> Result<Uuid, AppError> {
    let raw = ctx
        .route_param("id")
        .ok_or_else(|| AppError::Internal("route registered without {id}".to_string()))?;
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Case {} not found", raw)))
}

/// GET /api/cases - List cases, served from the cache when possible
pub async fn list(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let filter: CaseFilter = ctx.query_as()?;
    let key = list_key(&filter);

    if let Some(page) = get_json::<CasePage>(&state.cache, &key) {
        return Ok(with_cache_status(Json(page).into_response(), true));
    }

    let page = state.cases.list(&filter).await?;
    set_json(&state.cache, &key, &page, None);
    Ok(with_cache_status(Json(page).into_response(), false))
}

/// GET /api/cases/{id} - Read one case
pub async fn read(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let id = case_id(&ctx)?;
    let key = case_key(id);

    if let Some(case) = get_json::<ClinicalCase>(&state.cache, &key) {
        return Ok(with_cache_status(Json(case).into_response(), true));
    }

    let case = state
        .cases
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Case {} not found", id)))?;
    set_json(&state.cache, &key, &case, None);
    Ok(with_cache_status(Json(case).into_response(), false))
}

/// POST /api/cases - Create a case and drop cached listings
pub async fn create(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let new_case: NewCase = ctx.body_as()?;
    let created_by = ctx.subject_id().unwrap_or("unknown");
    let case = state.cases.create(new_case, created_by).await?;

    let removed = state
        .cache
        .invalidate_prefix(&CacheKey::resource_prefix(LIST_RESOURCE));
    tracing::info!(
        target: "audit",
        case_id = %case.id,
        created_by,
        invalidated = removed,
        "Case created"
    );

    let location = HeaderValue::from_str(&format!("/api/cases/{}", case.id))
        .map_err(|e| AppError::Internal(format!("Invalid location header: {}", e)))?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(case),
    )
        .into_response())
}

/// POST /api/cases/{id}/attempts - Record the caller's answer
pub async fn submit_attempt(state: AppState, _request: Request, ctx: Context) -> HandlerResult {
    let id = case_id(&ctx)?;
    let body: AttemptRequest = ctx.body_as()?;
    if Uuid::parse_str(&body.case_id).ok() != Some(id) {
        return Err(AppError::Validation(vec![rounds_core::FieldError::new(
            "caseId",
            "must match the case in the path",
        )]));
    }

    let subject_id = ctx
        .subject_id()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    let attempt = state
        .cases
        .record_attempt(id, subject_id, body.answer)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Case {} not found", id)))?;

    Ok((
        StatusCode::CREATED,
        Json(AttemptResponse {
            id: attempt.id,
            case_id: attempt.case_id,
            submitted_at: attempt.submitted_at,
        }),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rounds_core::Schema;

    #[test]
    fn test_list_key_normalizes_filters() {
        let a = CaseFilter {
            specialty: Some("Cardiology".into()),
            ..CaseFilter::default()
        };
        let b = CaseFilter {
            specialty: Some("cardiology".into()),
            ..CaseFilter::default()
        };
        assert_eq!(list_key(&a), list_key(&b));
        assert_eq!(list_key(&a), "cases?limit=20&page=1&specialty=cardiology");
        assert!(list_key(&a).starts_with(&CacheKey::resource_prefix(LIST_RESOURCE)));
    }

    #[test]
    fn test_list_key_folds_non_ascii_specialty() {
        let filter = |specialty: &str| CaseFilter {
            specialty: Some(specialty.into()),
            ..CaseFilter::default()
        };
        assert_eq!(list_key(&filter("ÉLAN")), list_key(&filter(" élan")));
    }

    #[test]
    fn test_page_beyond_u32_is_rejected() {
        let schema = list_query_schema();
        let errors = schema
            .validate(&serde_json::json!({ "page": 4_294_967_296_i64 }))
            .unwrap_err();
        assert_eq!(errors[0].field, "page");
    }

    #[test]
    fn test_case_key_is_not_a_listing() {
        let key = case_key(Uuid::nil());
        assert!(!key.starts_with(&CacheKey::resource_prefix(LIST_RESOURCE)));
    }
}
