//! Sources of earlier messages loaded when a conversation opens.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::message::{Author, Message};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history source unavailable: {0}")]
    Unavailable(String),
}

/// Yields messages that predate the current session.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn load(&self) -> Result<Vec<Message>, HistoryError>;
}

/// Simulated backend: waits, then returns a short canned exchange.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    delay: Duration,
}

impl SampleHistory {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(1200);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl HistorySource for SampleHistory {
    async fn load(&self) -> Result<Vec<Message>, HistoryError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![
            Message::new(Author::User, "This is an old message."),
            Message::new(Author::Assistant, "And this is an old reply."),
        ])
    }
}
