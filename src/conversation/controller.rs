//! Drives one conversation: history, status line, and the request lifecycle.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::client::RelayClient;
use super::history::Conversation;
use super::message::Message;
use super::source::{HistoryError, HistorySource};
use super::view::{DisplayRow, View, render};
use super::{Status, SubmitOutcome};

/// Cosmetic pause before the relay call, while the typing indicator shows.
pub const DEFAULT_TYPING_DELAY: Duration = Duration::from_millis(1200);

struct State {
    conversation: Conversation,
    status: Status,
}

/// The conversation controller.
///
/// Per submission the controller moves through
/// `Idle → UserMessageAppended → AwaitingAI → {AIMessageAppended | ErrorShown} → Idle`.
///
/// Submissions are served one at a time in arrival order, so replies can
/// never interleave with later questions. Each submission carries a
/// generation number; [`cancel_pending`](Self::cancel_pending) makes the
/// one in flight stale, and its reply is dropped when it arrives.
pub struct Controller<R, V> {
    state: Mutex<State>,
    relay: R,
    view: V,
    typing_delay: Duration,
    turn: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl<R: RelayClient, V: View> Controller<R, V> {
    pub fn new(conversation: Conversation, relay: R, view: V) -> Self {
        Self {
            state: Mutex::new(State {
                conversation,
                status: Status::Idle,
            }),
            relay,
            view,
            typing_delay: DEFAULT_TYPING_DELAY,
            turn: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_typing_delay(mut self, delay: Duration) -> Self {
        self.typing_delay = delay;
        self
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Snapshot of the history.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().conversation.history().messages().to_vec()
    }

    /// Questions submitted so far in this conversation.
    pub fn questions_asked(&self) -> u64 {
        self.lock().conversation.questions().get()
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Current display rows.
    pub fn rows(&self) -> Vec<DisplayRow> {
        render(self.lock().conversation.history())
    }

    /// Loads earlier messages from `source` and puts them before the current ones.
    ///
    /// Returns how many messages were added. On failure the history is left
    /// as it was and the status line reports the error.
    pub async fn load_prior_history(
        &self,
        source: &dyn HistorySource,
    ) -> Result<usize, HistoryError> {
        self.set_status(Status::LoadingHistory);

        match source.load().await {
            Ok(older) => {
                let added = older.len();
                let rows = {
                    let mut state = self.lock();
                    state.conversation.history_mut().prepend(older);
                    render(state.conversation.history())
                };
                self.view.render(&rows);
                self.finish_loading(Status::Idle);
                debug!(added, "prior history loaded");
                Ok(added)
            }
            Err(e) => {
                warn!(error = %e, "failed to load prior history");
                self.finish_loading(Status::HistoryFailed);
                Err(e)
            }
        }
    }

    /// Submits one user message and waits for the assistant's reply.
    ///
    /// Blank input is ignored without touching history or status. Otherwise
    /// the user message is appended and shown before the relay is called, and
    /// the question counter is incremented whatever the relay outcome.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let _turn = self.turn.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (rows, asked) = {
            let mut state = self.lock();
            state.conversation.history_mut().push(Message::user(text));
            let rows = render(state.conversation.history());
            let asked = state.conversation.questions_mut().increment();
            (rows, asked)
        };
        self.view.render(&rows);
        self.view.clear_input();
        self.set_status(Status::AwaitingReply);
        debug!(generation, asked, "question submitted");

        self.view.set_typing(true);
        tokio::time::sleep(self.typing_delay).await;
        self.view.set_typing(false);

        if self.is_stale(generation) {
            debug!(generation, "submission cancelled before relay call");
            return SubmitOutcome::Stale;
        }

        let result = self.relay.send(text).await;

        if self.is_stale(generation) {
            debug!(generation, "dropping reply for cancelled submission");
            return SubmitOutcome::Stale;
        }

        match result {
            Ok(reply) => {
                let rows = {
                    let mut state = self.lock();
                    state
                        .conversation
                        .history_mut()
                        .push(Message::assistant(reply.clone()));
                    render(state.conversation.history())
                };
                self.view.render(&rows);
                self.set_status(Status::Idle);
                SubmitOutcome::Replied(reply)
            }
            Err(e) => {
                warn!(error = %e, "relay call failed");
                self.set_status(Status::ConnectionError);
                SubmitOutcome::Failed
            }
        }
    }

    /// Abandons the submission in flight, if any, and clears the status line.
    ///
    /// The abandoned submission's reply is discarded when it arrives. Its
    /// user message stays in the history.
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.set_status(Status::Idle);
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: Status) {
        self.lock().status = status;
        self.view.set_status(&status);
    }

    // A submission may have claimed the status line while history was loading.
    fn finish_loading(&self, status: Status) {
        let updated = {
            let mut state = self.lock();
            if state.status == Status::LoadingHistory {
                state.status = status;
                true
            } else {
                false
            }
        };
        if updated {
            self.view.set_status(&status);
        }
    }
}
