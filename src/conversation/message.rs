//! Chat messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable chat message.
///
/// Fields are private; a message cannot change after it is created.
///
/// # Examples
///
/// ```
/// use relaychat::conversation::{Author, Message};
///
/// let msg = Message::user("2+2?");
/// assert_eq!(msg.author(), Author::User);
/// assert_eq!(msg.text(), "2+2?");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    author: Author,
    text: String,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self::at(author, text, Utc::now())
    }

    /// Creates a message with an explicit timestamp.
    pub fn at(author: Author, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            author,
            text: text.into(),
            created_at,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Author::Assistant, text)
    }

    pub fn author(&self) -> Author {
        self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_lowercase_author_and_camel_case_fields() {
        let created = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = Message::at(Author::Assistant, "4", created);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["author"], "assistant");
        assert_eq!(value["text"], "4");
        assert_eq!(value["createdAt"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn constructors_set_author() {
        assert_eq!(Message::user("a").author(), Author::User);
        assert_eq!(Message::assistant("b").author(), Author::Assistant);
        assert_eq!(Author::Assistant.to_string(), "assistant");
    }
}
