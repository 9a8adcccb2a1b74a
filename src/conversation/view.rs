//! Projection of a history into display rows, and the UI seam.

use chrono::{DateTime, Utc};

use super::Status;
use super::history::History;
use super::message::Author;

/// One rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub author: Author,
    /// Avatar glyph shown next to the text.
    pub avatar: &'static str,
    /// Style class, e.g. `message message-user`.
    pub class: &'static str,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Projects `history` into the full list of display rows.
///
/// Pure: the same history always yields the same rows, in history order.
/// Views receive the complete list on every change and rebuild from it.
///
/// # Examples
///
/// ```
/// use relaychat::conversation::{History, Message, render};
///
/// let mut history = History::new();
/// history.push(Message::user("hi"));
/// history.push(Message::assistant("hello"));
///
/// let rows = render(&history);
/// assert_eq!(rows[0].avatar, "😊");
/// assert_eq!(rows[1].class, "message message-assistant");
/// assert_eq!(rows, render(&history));
/// ```
pub fn render(history: &History) -> Vec<DisplayRow> {
    history
        .messages()
        .iter()
        .map(|msg| {
            let (avatar, class) = match msg.author() {
                Author::User => ("😊", "message message-user"),
                Author::Assistant => ("🤖", "message message-assistant"),
            };
            DisplayRow {
                author: msg.author(),
                avatar,
                class,
                text: msg.text().to_owned(),
                created_at: msg.created_at(),
            }
        })
        .collect()
}

/// The concrete UI a controller drives.
///
/// Calls arrive from whichever task runs the controller, never while the
/// controller holds its state lock.
pub trait View: Send + Sync {
    /// Replaces everything shown with `rows` and brings the last row into view.
    fn render(&self, rows: &[DisplayRow]);

    /// Shows `status` on the status line. [`Status::Idle`] clears it.
    fn set_status(&self, status: &Status);

    /// Shows or hides the typing indicator.
    fn set_typing(&self, _typing: bool) {}

    /// Empties the input field after a submission.
    fn clear_input(&self) {}
}
