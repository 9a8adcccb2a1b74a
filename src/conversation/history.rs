//! Conversation state: the append-only history and the question counter.

use super::message::Message;

/// Ordered, append-only list of messages. Insertion order is display order.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one message at the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Inserts an older batch in front of everything already present.
    ///
    /// Both the batch and the existing messages keep their relative order.
    pub fn prepend(&mut self, older: Vec<Message>) {
        self.messages.splice(0..0, older);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Counts submitted questions.
///
/// Starts at zero with every new [`Conversation`] and only ever goes up.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionCounter {
    count: u64,
}

impl QuestionCounter {
    /// Increments and returns the new count.
    pub fn increment(&mut self) -> u64 {
        self.count += 1;
        self.count
    }

    pub fn get(&self) -> u64 {
        self.count
    }
}

/// One conversation: its history and how many questions were asked in it.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    history: History,
    questions: QuestionCounter,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a conversation from an existing history. The counter starts at zero.
    pub fn with_history(history: History) -> Self {
        Self {
            history,
            questions: QuestionCounter::default(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn questions(&self) -> &QuestionCounter {
        &self.questions
    }

    pub fn questions_mut(&mut self) -> &mut QuestionCounter {
        &mut self.questions
    }
}
