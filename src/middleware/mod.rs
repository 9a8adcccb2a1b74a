//! Middleware pipeline: composable before/after logic around route handlers.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//!   When the chain is exhausted the request is dispatched to the router.
//! - [`LoggerMiddleware`]: request/response logger.
//!
//! Layers run in registration order: the first layer added with
//! [`Router::layer`](crate::router::Router::layer) sees the request first and
//! the response last.

use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;

use crate::{Response, context::Context, router::Router};

/// Boxed future returned by middleware.
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The core middleware trait.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may pass the
/// request through, short-circuit with their own [`Response`], or decorate the
/// downstream response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward a
/// request at most once.
pub struct Next {
    router: Arc<Router>,
    index: usize,
}

impl Next {
    pub(crate) fn new(router: Arc<Router>) -> Self {
        Self { router, index: 0 }
    }

    /// Invokes the next middleware, or the router once every layer has run.
    pub async fn run(self, ctx: Context) -> Response {
        match self.router.layer_at(self.index) {
            Some(layer) => {
                let next = Self {
                    router: Arc::clone(&self.router),
                    index: self.index + 1,
                };
                layer.handle(ctx, next).await
            }
            None => self.router.dispatch(ctx).await,
        }
    }
}

/// Logs method, path, peer, status and duration of every request.
///
/// Emits one `tracing::info!` event after the downstream handler completes and
/// returns the response unchanged.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().clone();
            let path = ctx.request().path().to_owned();
            let peer = ctx.peer();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                %peer,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::StatusCode;
    use crate::http::request::Request;

    fn ctx(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req, "127.0.0.1:4000".parse().unwrap())
    }

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Layer", tag);
                response
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> BoxResponse {
            Box::pin(async { Response::new(StatusCode::BadRequest) })
        }
    }

    #[tokio::test]
    async fn empty_chain_reaches_router() {
        let mut router = Router::new();
        router.post("/api/chat", |_ctx| async { Response::new(StatusCode::Ok) });
        let service = router.into_service();
        let res = service.call(ctx("POST", "/api/chat")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn layers_unwind_in_reverse_order() {
        let mut router = Router::new();
        router.post("/api/chat", |_ctx| async { Response::new(StatusCode::Ok) });
        router.layer(Tag("outer"));
        router.layer(Tag("inner"));
        let res = router.into_service().call(ctx("POST", "/api/chat")).await;
        let tags: Vec<_> = res
            .headers()
            .iter()
            .filter(|(k, _)| *k == "X-Layer")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(tags, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let mut router = Router::new();
        router.post("/api/chat", move |_ctx| {
            flag.store(true, Ordering::SeqCst);
            async { Response::new(StatusCode::Ok) }
        });
        router.layer(Deny);
        let res = router.into_service().call(ctx("POST", "/api/chat")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let mut router = Router::new();
        router.post("/api/chat", |_ctx| async {
            Response::new(StatusCode::Ok).body("pong")
        });
        router.layer(LoggerMiddleware);
        let res = router.into_service().call(ctx("POST", "/api/chat")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"pong");
    }
}
