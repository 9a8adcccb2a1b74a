//! Client side of the chat: conversation state and the controller driving it.
//!
//! ## Pieces
//!
//! - [`Message`], [`History`], [`QuestionCounter`], [`Conversation`]: the data.
//! - [`render`]: pure projection of a history into [`DisplayRow`]s.
//! - [`View`]: whatever UI shows the rows, the status line and the typing
//!   indicator. [`crate::terminal`] has a stdout implementation.
//! - [`RelayClient`] / [`HttpRelayClient`]: talks to `POST /api/chat`.
//! - [`HistorySource`] / [`SampleHistory`]: earlier messages to preload.
//! - [`Controller`]: ties it together.

use std::fmt;

pub mod client;
pub mod controller;
pub mod history;
pub mod message;
pub mod source;
pub mod view;

pub use client::{
    DEFAULT_RELAY_ENDPOINT, DEFAULT_RELAY_TIMEOUT, HttpRelayClient, RelayClient, RelayClientError,
};
pub use controller::{Controller, DEFAULT_TYPING_DELAY};
pub use history::{Conversation, History, QuestionCounter};
pub use message::{Author, Message};
pub use source::{HistoryError, HistorySource, SampleHistory};
pub use view::{DisplayRow, View, render};

/// What the status line currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Nothing to report; the status line is empty.
    #[default]
    Idle,
    LoadingHistory,
    AwaitingReply,
    HistoryFailed,
    ConnectionError,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "",
            Self::LoadingHistory => "Loading history...",
            Self::AwaitingReply => "Waiting for the AI to reply...",
            Self::HistoryFailed => "Failed to load history",
            Self::ConnectionError => "Connection error with the AI",
        })
    }
}

/// How a call to [`Controller::submit`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was blank; nothing happened.
    Ignored,
    /// The assistant's reply was appended.
    Replied(String),
    /// The relay call failed; the status line shows a connection error.
    Failed,
    /// The submission was cancelled and its reply discarded.
    Stale,
}
