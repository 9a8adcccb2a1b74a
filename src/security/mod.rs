//! Cross-origin access for browser chat widgets.
//!
//! The chat page is usually served from a different origin than the relay,
//! so the relay answers CORS preflights and decorates responses with
//! `Access-Control-*` headers.

use crate::Method;
use crate::context::Context;
use crate::middleware::{BoxResponse, Middleware, Next};
use crate::{Response, StatusCode};

/// CORS middleware.
///
/// # Behavior
///
/// - Requests without an `Origin` header, or from an origin not on the
///   allow-list, pass through unmodified.
/// - `OPTIONS` preflights from an allowed origin are answered with
///   `204 No Content`; the downstream handler is not called.
/// - Other requests run normally and get the CORS headers appended. A
///   specific (non-wildcard) origin is echoed back together with `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use relaychat::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new(["https://chat.example.com"]);
/// assert!(cors.allows("https://chat.example.com"));
/// assert!(!cors.allows("https://evil.example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: String,
    allowed_headers: String,
}

impl Default for CorsMiddleware {
    /// Allows every origin.
    fn default() -> Self {
        Self::new(["*"])
    }
}

impl CorsMiddleware {
    /// Creates a policy for the given origins. `"*"` allows any origin.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            allowed_methods: "POST, OPTIONS".to_owned(),
            allowed_headers: "Content-Type".to_owned(),
        }
    }

    /// Returns `true` if `origin` may call the relay.
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }

    fn allow_origin_value(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allows(origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

fn decorate(response: &mut Response, allow_origin: &str, methods: &str, headers: &str) {
    response.add_header("Access-Control-Allow-Origin", allow_origin);
    response.add_header("Access-Control-Allow-Methods", methods);
    response.add_header("Access-Control-Allow-Headers", headers);
    if allow_origin != "*" {
        response.add_header("Vary", "Origin");
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let allow_origin = ctx
            .request()
            .headers()
            .get("origin")
            .and_then(|origin| self.allow_origin_value(origin));
        let methods = self.allowed_methods.clone();
        let headers = self.allowed_headers.clone();

        Box::pin(async move {
            let Some(allow_origin) = allow_origin else {
                return next.run(ctx).await;
            };

            if ctx.request().method() == &Method::Options {
                let mut response =
                    Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600");
                decorate(&mut response, &allow_origin, &methods, &headers);
                return response;
            }

            let mut response = next.run(ctx).await;
            decorate(&mut response, &allow_origin, &methods, &headers);
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use crate::http::request::Request;

    fn ctx(method: &str, origin: Option<&str>) -> Context {
        let origin = origin
            .map(|o| format!("Origin: {o}\r\n"))
            .unwrap_or_default();
        let raw = format!("{method} /api/chat HTTP/1.1\r\nHost: localhost\r\n{origin}\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req, "127.0.0.1:4000".parse().unwrap())
    }

    fn router(cors: CorsMiddleware) -> crate::router::Service {
        let mut router = Router::new();
        router.post("/api/chat", |_ctx| async { Response::new(StatusCode::Ok) });
        router.layer(cors);
        router.into_service()
    }

    #[tokio::test]
    async fn no_origin_passes_through_untouched() {
        let res = router(CorsMiddleware::default()).call(ctx("POST", None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn preflight_is_answered_with_204() {
        let res = router(CorsMiddleware::default())
            .call(ctx("OPTIONS", Some("http://localhost:5500")))
            .await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(
            res.headers().get("access-control-allow-methods"),
            Some("POST, OPTIONS")
        );
        assert!(!res.headers().contains("vary"));
    }

    #[tokio::test]
    async fn specific_origin_is_echoed_with_vary() {
        let res = router(CorsMiddleware::new(["http://localhost:5500"]))
            .call(ctx("POST", Some("http://localhost:5500")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("http://localhost:5500")
        );
        assert_eq!(res.headers().get("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn foreign_origin_gets_no_cors_headers() {
        let res = router(CorsMiddleware::new(["http://localhost:5500"]))
            .call(ctx("POST", Some("http://evil.test")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }
}
