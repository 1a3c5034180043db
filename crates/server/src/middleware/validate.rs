//! Body and query validation layers

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Query, Request},
};
use futures_util::future::BoxFuture;
use rounds_core::{Context, Schema};
use serde_json::{Map, Value as JsonValue};

use crate::error::AppError;
use crate::pipeline::{Handler, HandlerResult, Middleware};

/// Largest request body the validation layer will buffer
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Validates the JSON body and stores the parsed value in `Context::parsed_body`
#[derive(Clone)]
pub struct ValidateBody {
    schema: Arc<dyn Schema>,
}

impl ValidateBody {
    pub fn new(schema: impl Schema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }
}

impl Middleware for ValidateBody {
    fn name(&self) -> &'static str {
        "validate_body"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ValidateBodyHandler {
            schema: self.schema.clone(),
            next,
        })
    }
}

struct ValidateBodyHandler {
    schema: Arc<dyn Schema>,
    next: Arc<dyn Handler>,
}

impl Handler for ValidateBodyHandler {
    fn call(&self, request: Request, mut ctx: Context) -> BoxFuture<'static, HandlerResult> {
        let schema = self.schema.clone();
        let next = self.next.clone();
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let bytes = to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| AppError::BadRequest(format!("Unreadable request body: {}", e)))?;

            let input: JsonValue = if bytes.is_empty() {
                JsonValue::Object(Map::new())
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|e| AppError::BadRequest(format!("Malformed JSON body: {}", e)))?
            };

            let parsed = schema.validate(&input).map_err(AppError::Validation)?;
            ctx.set_parsed_body(parsed)?;

            next.call(Request::from_parts(parts, Body::from(bytes)), ctx)
                .await
        })
    }
}

/// Validates the query string and stores the parsed value in `Context::parsed_query`
#[derive(Clone)]
pub struct ValidateQuery {
    schema: Arc<dyn Schema>,
}

impl ValidateQuery {
    pub fn new(schema: impl Schema) -> Self {
        Self {
            schema: Arc::new(schema),
        }
    }
}

impl Middleware for ValidateQuery {
    fn name(&self) -> &'static str {
        "validate_query"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ValidateQueryHandler {
            schema: self.schema.clone(),
            next,
        })
    }
}

struct ValidateQueryHandler {
    schema: Arc<dyn Schema>,
    next: Arc<dyn Handler>,
}

impl Handler for ValidateQueryHandler {
    fn call(&self, request: Request, mut ctx: Context) -> BoxFuture<'static, HandlerResult> {
        let validated = query_object(&request).and_then(|input| {
            let parsed = self.schema.validate(&input).map_err(AppError::Validation)?;
            ctx.set_parsed_query(parsed)?;
            Ok(())
        });

        let next = self.next.clone();
        Box::pin(async move {
            validated?;
            next.call(request, ctx).await
        })
    }
}

/// Decode the query string into an object of strings; repeated keys keep the last value
fn query_object(request: &Request) -> Result<JsonValue, AppError> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
        .map_err(|e| AppError::BadRequest(format!("Malformed query string: {}", e)))?;

    let object: Map<String, JsonValue> = pairs
        .into_iter()
        .map(|(name, value)| (name, JsonValue::String(value)))
        .collect();
    Ok(JsonValue::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use rounds_core::{FieldRule, ObjectSchema};
    use serde_json::json;

    use crate::pipeline::{Pipeline, handler_fn};

    fn echo_body() -> Arc<dyn Handler> {
        Pipeline::new()
            .layer(ValidateBody::new(
                ObjectSchema::new().field("caseId", FieldRule::string().required()),
            ))
            .handler(handler_fn(|_request, ctx: Context| async move {
                let body = ctx.parsed_body().cloned().unwrap_or_default();
                Ok(axum::Json(body).into_response())
            }))
    }

    fn post(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_reaches_handler() {
        let response = echo_body()
            .call(post(r#"{"caseId":"c-1"}"#), Context::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_field_is_reported() {
        match echo_body().call(post("{}"), Context::new()).await {
            Err(AppError::Validation(fields)) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "caseId");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        assert!(matches!(
            echo_body().call(post("{not json"), Context::new()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_query_is_coerced_into_context() {
        let handler = Pipeline::new()
            .layer(ValidateQuery::new(
                ObjectSchema::new()
                    .coerce_strings()
                    .field("page", FieldRule::integer().min(1).default(1))
                    .field("specialty", FieldRule::string()),
            ))
            .handler(handler_fn(|_request, ctx: Context| async move {
                assert_eq!(
                    ctx.parsed_query().unwrap(),
                    &json!({"page": 3, "specialty": "renal"})
                );
                Ok(StatusCode::OK.into_response())
            }));

        let request = Request::builder()
            .uri("/api/cases?specialty=renal&page=3&ignored=1")
            .body(Body::empty())
            .unwrap();
        assert!(handler.call(request, Context::new()).await.is_ok());

        let bad = Request::builder()
            .uri("/api/cases?page=0")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(
            handler.call(bad, Context::new()).await,
            Err(AppError::Validation(_))
        ));
    }
}
