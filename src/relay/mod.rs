//! The relay: `POST /api/chat` in, one upstream completion out.
//!
//! [`RelayService`] is stateless apart from the provider it wraps, so a single
//! instance is shared across every connection. [`router`] wires it to the
//! HTTP surface together with request logging and CORS.
//!
//! | Outcome                         | Status | Body                                   |
//! |---------------------------------|--------|----------------------------------------|
//! | reply extracted (or fallback)   | 200    | `{"reply": "..."}`                     |
//! | non-empty body that is not JSON | 400    | `{"error": "invalid JSON body"}`       |
//! | no body, `message` absent, blank or not a string | 400 | `{"error": "missing message"}` |
//! | upstream failed                 | 500    | `{"error": "...", "detail": "..."}`    |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::llm::{CompletionProvider, LlmError};
use crate::middleware::LoggerMiddleware;
use crate::security::CorsMiddleware;
use crate::{Response, Router, StatusCode};

/// Path of the single relay endpoint.
pub const CHAT_PATH: &str = "/api/chat";

/// Reply used when the provider answered without any text.
pub const FALLBACK_REPLY: &str = "No response.";

const MISSING_MESSAGE: &str = "missing message";
const INVALID_BODY: &str = "invalid JSON body";
const UPSTREAM_FAILED: &str = "upstream request failed";

/// Request body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    /// Reads a request body.
    ///
    /// An empty body and a `message` that is not a string both read as no
    /// message; only a body that is not JSON at all is an error.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.trim_ascii().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Ok(Self {
            message: value
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
        })
    }
}

/// Success body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Error body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_owned(),
            detail: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// Empty, blank, or absent user text.
    #[error("missing message")]
    MissingMessage,

    /// The provider call failed. The inner message is already redacted.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] LlmError),
}

/// Forwards user text to a [`CompletionProvider`].
pub struct RelayService {
    provider: Arc<dyn CompletionProvider>,
}

impl RelayService {
    pub fn new(provider: impl CompletionProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Relays one user message and returns the reply text.
    ///
    /// An upstream answer without text degrades to [`FALLBACK_REPLY`].
    ///
    /// # Errors
    ///
    /// - [`RelayError::MissingMessage`] if `user_text` is blank; the provider
    ///   is not called.
    /// - [`RelayError::Upstream`] on transport failure, non-2xx status, or an
    ///   undecodable payload.
    pub async fn relay(&self, user_text: &str) -> Result<String, RelayError> {
        if user_text.trim().is_empty() {
            return Err(RelayError::MissingMessage);
        }

        match self.provider.complete(user_text).await? {
            Some(reply) => {
                debug!(reply_len = reply.len(), "upstream replied");
                Ok(reply)
            }
            None => {
                debug!("upstream reply had no text, using fallback");
                Ok(FALLBACK_REPLY.to_owned())
            }
        }
    }

    /// Handles one `POST /api/chat` request.
    pub async fn handle(&self, ctx: Context) -> Response {
        let request = match ChatRequest::from_body(ctx.request().body()) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting unparseable chat request");
                return Response::json(StatusCode::BadRequest, &ErrorBody::new(INVALID_BODY));
            }
        };
        let message = request.message.unwrap_or_default();

        match self.relay(&message).await {
            Ok(reply) => Response::json(StatusCode::Ok, &ChatReply { reply }),
            Err(RelayError::MissingMessage) => {
                Response::json(StatusCode::BadRequest, &ErrorBody::new(MISSING_MESSAGE))
            }
            Err(RelayError::Upstream(e)) => {
                warn!(error = %e, "upstream call failed");
                Response::json(
                    StatusCode::InternalServerError,
                    &ErrorBody {
                        error: UPSTREAM_FAILED.to_owned(),
                        detail: Some(e.to_string()),
                    },
                )
            }
        }
    }
}

/// Builds the relay's router: `POST /api/chat` behind logging and CORS.
pub fn router(service: Arc<RelayService>, cors: CorsMiddleware) -> Router {
    let mut router = Router::new();
    router.post(CHAT_PATH, move |ctx: Context| {
        let service = Arc::clone(&service);
        async move { service.handle(ctx).await }
    });
    router.layer(LoggerMiddleware);
    router.layer(cors);
    router
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::http::request::Request;

    /// Canned provider that records the prompts it receives.
    struct Scripted {
        answer: Box<dyn Fn() -> Result<Option<String>, LlmError> + Send + Sync>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answer: impl Fn() -> Result<Option<String>, LlmError> + Send + Sync + 'static) -> Self {
            Self {
                answer: Box::new(answer),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for Arc<Scripted> {
        async fn complete(&self, prompt: &str) -> Result<Option<String>, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            (self.answer)()
        }
    }

    fn post(body: &str) -> Context {
        let raw = format!(
            "POST /api/chat HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req, "127.0.0.1:4000".parse().unwrap())
    }

    fn body_json(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body_ref()).unwrap()
    }

    #[tokio::test]
    async fn relay_returns_upstream_text() {
        let provider = Arc::new(Scripted::new(|| Ok(Some("hi".to_owned()))));
        let service = RelayService::new(Arc::clone(&provider));
        assert_eq!(service.relay("hello").await.unwrap(), "hi");
        assert_eq!(*provider.prompts.lock().unwrap(), vec!["hello".to_owned()]);
    }

    #[tokio::test]
    async fn relay_falls_back_when_no_text() {
        let service = RelayService::new(Arc::new(Scripted::new(|| Ok(None))));
        assert_eq!(service.relay("hello").await.unwrap(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn relay_rejects_blank_without_calling_upstream() {
        let provider = Arc::new(Scripted::new(|| Ok(Some("unused".to_owned()))));
        let service = RelayService::new(Arc::clone(&provider));
        assert!(matches!(service.relay("").await, Err(RelayError::MissingMessage)));
        assert!(matches!(service.relay("  \n").await, Err(RelayError::MissingMessage)));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_success_is_200_reply() {
        let service = RelayService::new(Arc::new(Scripted::new(|| Ok(Some("4".to_owned())))));
        let res = service.handle(post(r#"{"message":"2+2?"}"#)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(body_json(&res), serde_json::json!({ "reply": "4" }));
    }

    #[tokio::test]
    async fn handle_missing_message_is_400() {
        let service = RelayService::new(Arc::new(Scripted::new(|| Ok(None))));
        for body in [
            "",
            "  \r\n",
            r#"{}"#,
            r#"{"message":""}"#,
            r#"{"message":null}"#,
            r#"{"message":42}"#,
            r#"{"message":["hi"]}"#,
        ] {
            let res = service.handle(post(body)).await;
            assert_eq!(res.status(), StatusCode::BadRequest, "body {body}");
            assert_eq!(body_json(&res), serde_json::json!({ "error": "missing message" }));
        }
    }

    #[tokio::test]
    async fn handle_unparseable_body_is_400() {
        let service = RelayService::new(Arc::new(Scripted::new(|| Ok(None))));
        let res = service.handle(post("not json")).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert_eq!(body_json(&res)["error"], "invalid JSON body");
    }

    #[tokio::test]
    async fn handle_upstream_failure_is_500_with_detail() {
        let service = RelayService::new(Arc::new(Scripted::new(|| {
            Err(LlmError::Transport("connection refused".to_owned()))
        })));
        let res = service.handle(post(r#"{"message":"hello"}"#)).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        let body = body_json(&res);
        assert_eq!(body["error"], "upstream request failed");
        assert_eq!(body["detail"], "transport error: connection refused");
    }

    #[tokio::test]
    async fn router_serves_chat_path() {
        let service = Arc::new(RelayService::new(Arc::new(Scripted::new(|| {
            Ok(Some("pong".to_owned()))
        }))));
        let svc = router(service, CorsMiddleware::default()).into_service();
        let res = svc.call(post(r#"{"message":"ping"}"#)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(body_json(&res)["reply"], "pong");
    }

    #[tokio::test]
    async fn chat_round_trip_over_the_wire() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use crate::conversation::{Author, Controller, Conversation, HttpRelayClient, SubmitOutcome};
        use crate::llm::{ApiKey, OpenAiClient};
        use crate::server::Server;
        use crate::terminal::TerminalView;

        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "4" } }]
            })))
            .mount(&upstream)
            .await;

        let provider = OpenAiClient::new(ApiKey::new("sk-test"))
            .unwrap()
            .with_endpoint(format!("{}/v1/chat/completions", upstream.uri()));
        let svc = router(Arc::new(RelayService::new(provider)), CorsMiddleware::default()).into_service();

        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(move |ctx| svc.call(ctx), async {
            let _ = stop_rx.await;
        }));

        let controller = Controller::new(
            Conversation::new(),
            HttpRelayClient::new(format!("http://{addr}{CHAT_PATH}")),
            TerminalView::new(Vec::new()),
        )
        .with_typing_delay(std::time::Duration::ZERO);

        assert_eq!(controller.submit("2+2?").await, SubmitOutcome::Replied("4".to_owned()));
        let messages = controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].author(), Author::Assistant);
        assert_eq!(messages[1].text(), "4");

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
