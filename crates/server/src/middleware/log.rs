//! Request logging layer

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rounds_core::Context;

use crate::error::AppError;
use crate::pipeline::{Handler, HandlerResult, Middleware};

/// Logs each request on entry and completion.
///
/// Placed first in a pipeline it also records requests rejected by later
/// layers. A panic in the inner chain is logged and rendered as an internal
/// error.
#[derive(Clone, Copy, Default)]
pub struct Log;

impl Middleware for Log {
    fn name(&self) -> &'static str {
        "log"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(LogHandler { next })
    }
}

struct LogHandler {
    next: Arc<dyn Handler>,
}

impl Handler for LogHandler {
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, HandlerResult> {
        let next = self.next.clone();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = ctx.request_id().unwrap_or("unknown").to_string();
        let client = ctx
            .client_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Box::pin(async move {
            tracing::debug!(
                target: "request",
                request_id = %request_id,
                method = %method,
                path = %path,
                client = %client,
                "Request started"
            );

            let start = Instant::now();
            let result = match AssertUnwindSafe(async move { next.call(request, ctx).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Internal(format!(
                    "handler panicked on {} {}",
                    method, path
                ))),
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            match &result {
                // Layers such as rate limiting render inner errors themselves
                Ok(response) if response.status().is_server_error() => {
                    tracing::error!(
                        target: "request",
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms,
                        "Request failed"
                    );
                }
                Ok(response) => {
                    tracing::info!(
                        target: "request",
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms,
                        "Request completed"
                    );
                }
                Err(err) if err.status().is_server_error() => {
                    tracing::error!(
                        target: "request",
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = err.status().as_u16(),
                        error = %err,
                        duration_ms,
                        "Request failed"
                    );
                }
                Err(err) => {
                    tracing::info!(
                        target: "request",
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = err.status().as_u16(),
                        error = %err,
                        duration_ms,
                        "Request rejected"
                    );
                }
            }

            result
        })
    }
}
