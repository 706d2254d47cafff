//! In-process [`PersistenceGateway`]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{PersistenceGateway, StoreWrite};
use crate::error::Result;
use crate::providers::{ChatHistoryItem, Role};

#[derive(Debug, Default)]
struct SessionRecord {
    messages: Vec<ChatHistoryItem>,
    writes: Vec<StoreWrite>,
}

/// Map-backed store that also records every write it receives
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current messages of a session
    pub fn messages(&self, session_id: &str) -> Vec<ChatHistoryItem> {
        self.lock()
            .get(session_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default()
    }

    /// Content of the trailing assistant message, if any
    pub fn last_assistant(&self, session_id: &str) -> Option<String> {
        self.lock().get(session_id).and_then(|r| {
            r.messages
                .last()
                .filter(|m| m.role == Role::Assistant)
                .map(|m| m.content.clone())
        })
    }

    /// Every write received for a session, in order
    pub fn writes(&self, session_id: &str) -> Vec<StoreWrite> {
        self.lock()
            .get(session_id)
            .map(|r| r.writes.clone())
            .unwrap_or_default()
    }

    /// Ids of all sessions holding at least one write
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn append_message(&self, session_id: &str, message: &ChatHistoryItem) -> Result<()> {
        let mut sessions = self.lock();
        let record = sessions.entry(session_id.to_string()).or_default();
        record.messages.push(message.clone());
        record
            .writes
            .push(StoreWrite::Append(message.content.clone()));
        Ok(())
    }

    async fn replace_last_assistant_message(&self, session_id: &str, content: &str) -> Result<()> {
        let mut sessions = self.lock();
        let record = sessions.entry(session_id.to_string()).or_default();
        match record.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => last.content = content.to_string(),
            _ => record
                .messages
                .push(ChatHistoryItem::new(Role::Assistant, content)),
        }
        record.writes.push(StoreWrite::Replace(content.to_string()));
        Ok(())
    }

    async fn remove_last_assistant_message(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.lock();
        let Some(record) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        record.writes.push(StoreWrite::Remove);
        match record
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        {
            Some(index) => {
                record.messages.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatHistoryItem>> {
        Ok(self.messages(session_id))
    }

    async fn touch_session(&self, session_id: &str) -> Result<()> {
        if let Some(record) = self.lock().get_mut(session_id) {
            record.writes.push(StoreWrite::Touch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_appends_then_overwrites() {
        let store = InMemoryStore::new();
        store
            .append_message("s", &ChatHistoryItem::new(Role::User, "hi"))
            .await
            .unwrap();
        store.replace_last_assistant_message("s", "He").await.unwrap();
        store
            .replace_last_assistant_message("s", "Hello")
            .await
            .unwrap();
        store
            .replace_last_assistant_message("s", "Hello")
            .await
            .unwrap();

        let messages = store.messages("s");
        assert_eq!(messages.len(), 2);
        assert_eq!(store.last_assistant("s").as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_remove_last_assistant_wherever_it_sits() {
        let store = InMemoryStore::new();
        for (role, text) in [
            (Role::User, "A"),
            (Role::Assistant, "B"),
            (Role::User, "C"),
        ] {
            store
                .append_message("s", &ChatHistoryItem::new(role, text))
                .await
                .unwrap();
        }
        assert!(store.remove_last_assistant_message("s").await.unwrap());
        let contents: Vec<String> = store.messages("s").into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["A", "C"]);
        assert!(!store.remove_last_assistant_message("s").await.unwrap());
        assert!(!store.remove_last_assistant_message("unknown").await.unwrap());
    }
}
