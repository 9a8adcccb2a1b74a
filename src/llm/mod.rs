//! Upstream LLM provider: OpenAI-compatible chat completion client.
//!
//! The relay is the only component holding the provider credential. The key
//! lives in an [`ApiKey`] that never prints itself, and every diagnostic that
//! leaves this module is passed through [`ApiKey::redact`] first.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default chat-completion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for single-turn completions.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest slice of an upstream error body we keep for diagnostics.
const MAX_ERROR_BODY: usize = 512;

/// Errors from talking to the upstream provider.
///
/// Messages are already redacted; they are safe to log and to return to a
/// client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("could not build HTTP client: {0}")]
    Setup(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream payload could not be decoded: {0}")]
    Decode(String),
}

/// Provider credential.
///
/// `Debug` and `Display` print `***` so the key cannot end up in a log line
/// or an error by accident.
///
/// # Examples
///
/// ```
/// use relaychat::llm::ApiKey;
///
/// let key = ApiKey::new("sk-secret");
/// assert_eq!(format!("{key:?}"), "ApiKey(***)");
/// assert_eq!(key.redact("bad key sk-secret"), "bad key ***");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Replaces every occurrence of the key in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        if self.is_empty() {
            text.to_owned()
        } else {
            text.replace(&self.0, "***")
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Something that turns one user prompt into one completion.
///
/// `Ok(None)` means the provider answered successfully but the answer held no
/// extractable text; callers decide how to degrade.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Option<String>, LlmError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [PromptMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    /// Text of the first choice; empty text counts as missing.
    fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()?
            .message?
            .content
            .filter(|text| !text.is_empty())
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: ApiKey,
}

impl OpenAiClient {
    /// Creates a client for [`DEFAULT_ENDPOINT`] and [`DEFAULT_MODEL`].
    ///
    /// # Errors
    ///
    /// [`LlmError::Setup`] if the TLS backend cannot be initialised.
    pub fn new(api_key: ApiKey) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Setup(api_key.redact(&e.to_string())))?;
        Ok(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key,
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: [PromptMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "sending completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(self.api_key.redact(&e.to_string())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(self.api_key.redact(&e.to_string())))?;

        if !status.is_success() {
            let mut body = self.api_key.redact(&body);
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Decode(self.api_key.redact(&e.to_string())))?;
        Ok(parsed.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "sk-test-0123456789";

    async fn client_for(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(ApiKey::new(KEY))
            .unwrap()
            .with_endpoint(format!("{}/v1/chat/completions", server.uri()))
    }

    #[test]
    fn api_key_never_formats_itself() {
        let key = ApiKey::new(KEY);
        assert!(!format!("{key:?}").contains(KEY));
        assert!(!key.to_string().contains(KEY));
        assert_eq!(key.expose(), KEY);
    }

    #[test]
    fn blank_key_is_empty() {
        assert!(ApiKey::new("   ").is_empty());
        assert!(!ApiKey::new(KEY).is_empty());
    }

    #[test]
    fn empty_content_counts_as_missing() {
        let parsed: CompletionResponse =
            serde_json::from_value(json!({ "choices": [{ "message": { "content": "" } }] }))
                .unwrap();
        assert_eq!(parsed.into_text(), None);
    }

    #[tokio::test]
    async fn sends_bearer_and_single_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", format!("Bearer {KEY}").as_str()))
            .and(body_json(json!({
                "model": DEFAULT_MODEL,
                "messages": [{ "role": "user", "content": "hello" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hi" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).await.complete("hello").await.unwrap();
        assert_eq!(reply.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn missing_choices_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
            .mount(&server)
            .await;

        let reply = client_for(&server).await.complete("hello").await.unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn error_status_is_redacted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": format!("Incorrect API key provided: {KEY}") }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
        assert!(!err.to_string().contains(KEY));
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiClient::new(ApiKey::new(KEY))
            .unwrap()
            .with_endpoint(format!("http://{addr}/v1/chat/completions"));
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
        assert!(!err.to_string().contains(KEY));
    }
}
