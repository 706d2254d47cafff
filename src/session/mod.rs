//! Generation task bookkeeping
//!
//! This module holds the identifiers and cancellable handles that tie a
//! streaming generation to the conversation it belongs to, plus the
//! [`SessionTaskRegistry`] that enforces one live generation per session.

pub mod registry;

pub use registry::SessionTaskRegistry;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Conversation identifier
pub type SessionId = String;

/// Opaque identifier correlating a request with its cancellable jobs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random task id
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::session::TaskId;
    ///
    /// let a = TaskId::new();
    /// let b = TaskId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cancellable handle to one running job
///
/// Cancellation is cooperative: the job observes the token at each
/// suspension point and winds itself down.
#[derive(Debug, Clone)]
pub struct JobHandle {
    task_id: TaskId,
    token: CancellationToken,
}

impl JobHandle {
    /// Wrap a token belonging to `task_id`
    pub fn new(task_id: TaskId, token: CancellationToken) -> Self {
        Self { task_id, token }
    }

    /// Task this job belongs to
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// A clone of the job's cancellation token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
