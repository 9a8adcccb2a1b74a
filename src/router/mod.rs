//! Request routing: map method + exact path to handler functions.
//!
//! The relay exposes a single endpoint, so routes are literal paths. Trailing
//! slashes are normalized on both the registered path and the incoming one.
//!
//! | Outcome                              | Response                      |
//! |--------------------------------------|-------------------------------|
//! | method and path match                | handler's response            |
//! | path matches, method does not        | `405` with an `Allow` header  |
//! | nothing matches                      | `404 {"error":"not found"}`   |

use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Method, Response, StatusCode};

/// Type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Blanket-implemented for every `Fn(Context) -> impl Future<Output = Response>`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// Method + path router with an attached middleware stack.
///
/// # Examples
///
/// ```rust,no_run
/// use relaychat::{Response, Router, StatusCode};
/// use relaychat::middleware::LoggerMiddleware;
///
/// let mut router = Router::new();
/// router.post("/api/chat", |_ctx| async { Response::new(StatusCode::Ok) });
/// router.layer(LoggerMiddleware);
/// let service = router.into_service();
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `POST` requests to `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Appends a middleware layer. The first layer added is the outermost.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        self.layers.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freezes the router into a cheaply cloneable [`Service`].
    pub fn into_service(self) -> Service {
        Service {
            router: Arc::new(self),
        }
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    pub(crate) fn layer_at(&self, index: usize) -> Option<&Arc<dyn Middleware>> {
        self.layers.get(index)
    }

    /// Runs the first route matching method and path.
    pub(crate) async fn dispatch(&self, ctx: Context) -> Response {
        let path = normalize(ctx.request().path()).to_owned();
        let method = ctx.request().method().clone();

        let mut allowed: Vec<&str> = Vec::new();
        for route in self.routes.iter().filter(|r| r.path == path) {
            if route.method == method {
                let handler = Arc::clone(&route.handler);
                return handler(ctx).await;
            }
            allowed.push(route.method.as_str());
        }

        if allowed.is_empty() {
            Response::json(StatusCode::NotFound, &json!({ "error": "not found" }))
        } else {
            Response::json(
                StatusCode::MethodNotAllowed,
                &json!({ "error": "method not allowed" }),
            )
            .header("Allow", allowed.join(", "))
        }
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// A frozen router plus its middleware, shared across connections.
#[derive(Clone)]
pub struct Service {
    router: Arc<Router>,
}

impl Service {
    /// Runs `ctx` through the middleware chain and the router.
    ///
    /// The returned future owns everything it needs, so it can be handed
    /// straight to [`Server::run_until`](crate::server::Server::run_until).
    pub fn call(&self, ctx: Context) -> impl Future<Output = Response> + Send + use<> {
        let next = Next::new(Arc::clone(&self.router));
        async move { next.run(ctx).await }
    }
}
