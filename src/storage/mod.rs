//! Conversation persistence
//!
//! The streaming engine talks to storage only through [`PersistenceGateway`].
//! Two implementations ship with the crate: [`SqliteStorage`] for the CLI
//! and [`InMemoryStore`] for embedding and tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::providers::ChatHistoryItem;

pub mod memory;
pub mod sqlite;
pub mod types;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStorage;
pub use types::{StoreWrite, StoredSession};

/// Per-session message persistence consumed by the chat engine
///
/// Every method must be safe to call repeatedly. Replacing the last
/// assistant message with the same content twice leaves the same state as
/// doing it once.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Append a message to the end of a session, creating the session if needed
    async fn append_message(&self, session_id: &str, message: &ChatHistoryItem) -> Result<()>;

    /// Overwrite the trailing assistant message
    ///
    /// When the session does not end with an assistant message, the content
    /// is appended as a new one.
    async fn replace_last_assistant_message(&self, session_id: &str, content: &str) -> Result<()>;

    /// Delete the most recent assistant message, wherever it sits
    ///
    /// Returns false when the session has no assistant message.
    async fn remove_last_assistant_message(&self, session_id: &str) -> Result<bool>;

    /// Messages of a session, oldest first
    async fn load_messages(&self, session_id: &str) -> Result<Vec<ChatHistoryItem>>;

    /// Mark a session as recently updated
    async fn touch_session(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}
