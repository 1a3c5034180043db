//! Authentication layer and the identity collaborator it consults

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderMap, header},
};
use futures_util::future::BoxFuture;
use rounds_core::Context;
use thiserror::Error;

use crate::error::AppError;
use crate::pipeline::{Handler, HandlerResult, Middleware};

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves request credentials to a verified subject id
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// `Ok(None)` when the request carries no valid credentials
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<String>, IdentityError>;
}

/// API key authentication backed by a static key -> subject table
#[derive(Clone, Default)]
pub struct ApiKeyIdentity {
    keys: HashMap<String, String>,
}

impl ApiKeyIdentity {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }

    /// Key from `X-API-Key`, else from `Authorization: Bearer`
    fn presented_key(headers: &HeaderMap) -> Option<&str> {
        if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            return Some(key);
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

#[async_trait]
impl IdentityProvider for ApiKeyIdentity {
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<String>, IdentityError> {
        Ok(Self::presented_key(headers).and_then(|key| self.keys.get(key).cloned()))
    }
}

/// Rejects requests without a verified subject; sets `Context::subject_id`
#[derive(Clone)]
pub struct Authenticate {
    identity: Arc<dyn IdentityProvider>,
}

impl Authenticate {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }
}

impl Middleware for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(AuthenticateHandler {
            identity: self.identity.clone(),
            next,
        })
    }
}

struct AuthenticateHandler {
    identity: Arc<dyn IdentityProvider>,
    next: Arc<dyn Handler>,
}

impl Handler for AuthenticateHandler {
    fn call(&self, request: Request, mut ctx: Context) -> BoxFuture<'static, HandlerResult> {
        let identity = self.identity.clone();
        let next = self.next.clone();
        Box::pin(async move {
            let identified = identity.identify(request.headers()).await;
            match identified {
                Ok(Some(subject_id)) => {
                    ctx.set_subject_id(subject_id)?;
                    next.call(request, ctx).await
                }
                Ok(None) => Err(AppError::Unauthorized(
                    "Missing or invalid API key".to_string(),
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "Identity provider failed");
                    Err(AppError::Unauthorized("Authentication failed".to_string()))
                }
            }
        })
    }
}
