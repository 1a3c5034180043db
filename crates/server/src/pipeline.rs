//! Middleware composition.
//!
//! A [`Middleware`] wraps the handler chain built by every layer after it and
//! returns a new [`Handler`]. [`Pipeline::handler`] folds the layers around a
//! terminal handler so the first layer added is the outermost: it runs first
//! and observes the final result last.
//!
//! ```text
//! Pipeline::new().layer(A).layer(B).handler(h)  ==  A.wrap(B.wrap(h))
//! ```
//!
//! A layer rejects a request by returning without calling `next`; nothing
//! after it runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use rounds_core::Context;

use crate::error::AppError;
use crate::middleware::client_addr::TrustedProxies;
use crate::middleware::request_id::RequestId;

pub type HandlerResult = Result<Response, AppError>;

/// A request handler: either a business handler or a wrapped chain
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, HandlerResult>;
}

/// A pipeline layer
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Wrap `next`, the chain built by all later layers
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Handler backed by an async function or closure
pub struct FnHandler<F>(F);

/// Turn an async function of `(Request, Context)` into a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler(f)
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(request, ctx))
    }
}

/// Ordered list of layers
#[derive(Clone, Default)]
pub struct Pipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

/// Build a pipeline from layers in outermost-first order
pub fn compose(layers: Vec<Arc<dyn Middleware>>) -> Pipeline {
    Pipeline { layers }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer inside all previously added ones
    pub fn layer<M: Middleware>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names, outermost first
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    /// Wrap `terminal` in every layer
    pub fn handler<H: Handler>(&self, terminal: H) -> Arc<dyn Handler> {
        self.layers
            .iter()
            .rev()
            .fold(Arc::new(terminal) as Arc<dyn Handler>, |next, layer| {
                layer.wrap(next)
            })
    }
}

/// Adapt a composed handler into an axum handler.
///
/// Builds the request's [`Context`] from the router's path parameters, the
/// caller's address (see [`TrustedProxies`]) and the request id, runs the
/// chain and renders any [`AppError`] as a response.
pub fn into_route(
    handler: Arc<dyn Handler>,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |request: Request| {
        let handler = handler.clone();
        let response: BoxFuture<'static, Response> = Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            let ctx = request_context(&mut parts).await;
            let request = Request::from_parts(parts, body);

            match handler.call(request, ctx).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            }
        });
        response
    }
}

async fn request_context(parts: &mut Parts) -> Context {
    let route_params: HashMap<String, String> =
        match RawPathParams::from_request_parts(parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            Err(_) => HashMap::new(),
        };

    let request_id = parts.extensions.get::<RequestId>().map(|r| r.0.clone());

    Context::new()
        .with_route_params(route_params)
        .with_client_addr(TrustedProxies::resolve_parts(parts))
        .with_request_id(request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::extract::ConnectInfo;
    use parking_lot::Mutex;
    use std::net::SocketAddr;

    /// Records entry and exit so nesting order is observable
    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    struct TraceHandler {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        next: Arc<dyn Handler>,
    }

    impl Middleware for Trace {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
            Arc::new(TraceHandler {
                name: self.name,
                log: self.log.clone(),
                next,
            })
        }
    }

    impl Handler for TraceHandler {
        fn call(&self, request: Request, ctx: Context) -> BoxFuture<'static, HandlerResult> {
            let name = self.name;
            let log = self.log.clone();
            let next = self.next.clone();
            Box::pin(async move {
                log.lock().push(format!("{name}:enter"));
                let result = next.call(request, ctx).await;
                log.lock().push(format!("{name}:exit"));
                result
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn wrap(&self, _next: Arc<dyn Handler>) -> Arc<dyn Handler> {
            Arc::new(handler_fn(|_request, _ctx| async {
                Err(AppError::Unauthorized("rejected".into()))
            }))
        }
    }

    fn recording_terminal(log: Arc<Mutex<Vec<String>>>) -> impl Handler {
        handler_fn(move |_request, _ctx| {
            let log = log.clone();
            async move {
                log.lock().push("handler".to_string());
                Ok(StatusCode::OK.into_response())
            }
        })
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_first_layer_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .layer(Trace { name: "a", log: log.clone() })
            .layer(Trace { name: "b", log: log.clone() });

        let handler = pipeline.handler(recording_terminal(log.clone()));
        handler.call(request(), Context::new()).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["a:enter", "b:enter", "handler", "b:exit", "a:exit"]
        );
    }

    #[tokio::test]
    async fn test_compose_matches_manual_nesting() {
        let composed_log = Arc::new(Mutex::new(Vec::new()));
        let composed = compose(vec![
            Arc::new(Trace { name: "a", log: composed_log.clone() }),
            Arc::new(Trace { name: "b", log: composed_log.clone() }),
        ])
        .handler(recording_terminal(composed_log.clone()));

        let manual_log = Arc::new(Mutex::new(Vec::new()));
        let a = Trace { name: "a", log: manual_log.clone() };
        let b = Trace { name: "b", log: manual_log.clone() };
        let manual = a.wrap(b.wrap(Arc::new(recording_terminal(manual_log.clone()))));

        composed.call(request(), Context::new()).await.unwrap();
        manual.call(request(), Context::new()).await.unwrap();

        assert_eq!(*composed_log.lock(), *manual_log.lock());
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new()
            .layer(Trace { name: "outer", log: log.clone() })
            .layer(Reject)
            .layer(Trace { name: "inner", log: log.clone() });

        let result = pipeline
            .handler(recording_terminal(log.clone()))
            .call(request(), Context::new())
            .await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
        assert_eq!(*log.lock(), vec!["outer:enter", "outer:exit"]);
        assert_eq!(pipeline.names(), vec!["outer", "reject", "inner"]);
    }

    #[tokio::test]
    async fn test_into_route_renders_errors() {
        let route = into_route(Pipeline::new().layer(Reject).handler(handler_fn(
            |_request, _ctx| async { Ok(StatusCode::OK.into_response()) },
        )));

        let response = route(request()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    async fn resolved_addr(request: Request) -> String {
        let route = into_route(Arc::new(handler_fn(|_request, ctx: Context| async move {
            let addr = ctx.client_addr().map(|a| a.to_string()).unwrap_or_default();
            Ok(addr.into_response())
        })));
        let response = route(request).await;
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn forwarded_from(peer: &str) -> Request {
        let mut request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "198.51.100.1, 203.0.113.9")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(peer.parse().unwrap(), 40000)));
        request
    }

    #[tokio::test]
    async fn test_context_takes_forwarded_address_from_trusted_proxy() {
        let mut request = forwarded_from("10.0.0.1");
        request
            .extensions_mut()
            .insert(TrustedProxies::new(vec!["10.0.0.1".parse().unwrap()]));

        assert_eq!(resolved_addr(request).await, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_context_ignores_forwarded_address_from_client() {
        let mut request = forwarded_from("192.0.2.44");
        request
            .extensions_mut()
            .insert(TrustedProxies::new(vec!["10.0.0.1".parse().unwrap()]));
        assert_eq!(resolved_addr(request).await, "192.0.2.44");

        // No proxy configuration at all
        assert_eq!(resolved_addr(forwarded_from("192.0.2.44")).await, "192.0.2.44");
    }
}
