use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a stored conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    /// Unique identifier for the session
    pub id: String,
    /// Title derived from the first user message
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last updated
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the session
    pub message_count: usize,
}

/// One persistence call, as recorded by [`super::InMemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// `append_message`
    Append(String),
    /// `replace_last_assistant_message`
    Replace(String),
    /// `remove_last_assistant_message`
    Remove,
    /// `touch_session`
    Touch,
}

pub(crate) const DEFAULT_TITLE: &str = "New chat";
const TITLE_LENGTH: usize = 50;

/// Session title derived from a message
pub(crate) fn title_from(content: &str) -> String {
    let line = content.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    let mut title: String = line.chars().take(TITLE_LENGTH).collect();
    if line.chars().count() > TITLE_LENGTH {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_line() {
        assert_eq!(title_from("Hello\nworld"), "Hello");
        assert_eq!(title_from("   "), DEFAULT_TITLE);
        let long = "x".repeat(80);
        assert_eq!(title_from(&long).chars().count(), TITLE_LENGTH + 3);
    }
}
