//! Terminal front-end: a [`View`] on any writer plus a line-based chat loop.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::conversation::{
    Controller, DisplayRow, HistorySource, RelayClient, Status, SubmitOutcome, View,
};

/// Clears the screen and moves the cursor home.
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Input line that ends the session.
pub const QUIT: &str = "/quit";

/// Draws the conversation on a character terminal.
///
/// Every render clears the screen and redraws all rows, so the newest
/// message is always the last thing on screen.
pub struct TerminalView<W> {
    out: Mutex<W>,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, f: impl FnOnce(&mut W) -> io::Result<()>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = f(&mut *out).and_then(|()| out.flush()) {
            warn!(error = %e, "terminal write failed");
        }
    }
}

impl<W: Write + Send> View for TerminalView<W> {
    fn render(&self, rows: &[DisplayRow]) {
        self.write(|out| {
            out.write_all(CLEAR.as_bytes())?;
            for row in rows {
                writeln!(out, "{} {}", row.avatar, row.text)?;
            }
            Ok(())
        });
    }

    fn set_status(&self, status: &Status) {
        if *status != Status::Idle {
            self.write(|out| writeln!(out, "[{status}]"));
        }
    }

    fn set_typing(&self, typing: bool) {
        if typing {
            self.write(|out| writeln!(out, "🤖 typing..."));
        }
    }
}

/// Runs an interactive session on stdin.
///
/// Prior history loads in the background while the user can already type.
/// Each line is submitted in turn; [`QUIT`] or end of input stops the loop.
pub async fn run<R, V>(
    controller: Arc<Controller<R, V>>,
    history: Option<Arc<dyn HistorySource>>,
) -> io::Result<()>
where
    R: RelayClient + 'static,
    V: View + 'static,
{
    if let Some(source) = history {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            // Failure is already on the status line.
            let _ = controller.load_prior_history(source.as_ref()).await;
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == QUIT {
            break;
        }
        if let SubmitOutcome::Failed = controller.submit(&line).await {
            warn!("reply not received; is the relay running?");
        }
    }
    Ok(())
}
