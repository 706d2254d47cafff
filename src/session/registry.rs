//! Per-session generation task registry
//!
//! The registry is the only structure mutated concurrently by send,
//! regenerate, and session-switch flows. Every operation runs inside one
//! critical section so that at most one generation is live per session.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use super::{JobHandle, TaskId};

/// Jobs stored for one session
#[derive(Debug)]
struct SessionJobs {
    streaming: JobHandle,
    hint: Option<JobHandle>,
}

impl SessionJobs {
    fn cancel(&self) {
        self.streaming.cancel();
        if let Some(hint) = &self.hint {
            hint.cancel();
        }
    }
}

/// Registry of in-flight generation jobs keyed by session id
///
/// The registry never looks inside a job; it only holds and cancels opaque
/// handles. The underlying map is never exposed.
///
/// # Examples
///
/// ```
/// use streamchat::session::{JobHandle, SessionTaskRegistry, TaskId};
/// use tokio_util::sync::CancellationToken;
///
/// let registry = SessionTaskRegistry::new();
/// let first = JobHandle::new(TaskId::new(), CancellationToken::new());
/// registry.register("s1", first.clone(), None);
///
/// let second = JobHandle::new(TaskId::new(), CancellationToken::new());
/// registry.register("s1", second.clone(), None);
///
/// assert!(first.is_cancelled());
/// assert_eq!(registry.current_task("s1"), Some(second.task_id().clone()));
/// ```
#[derive(Debug, Default)]
pub struct SessionTaskRegistry {
    jobs: Mutex<HashMap<String, SessionJobs>>,
}

impl SessionTaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionJobs>> {
        // A panic while holding the lock cannot leave the map half-written:
        // every mutation is a single insert or remove.
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the jobs for a session, cancelling whatever was there first
    ///
    /// Returns the task id of the evicted generation, if any.
    pub fn register(
        &self,
        session_id: &str,
        streaming: JobHandle,
        hint: Option<JobHandle>,
    ) -> Option<TaskId> {
        let mut jobs = self.lock();
        let evicted = jobs.remove(session_id).map(|previous| {
            previous.cancel();
            warn!(
                session_id = %session_id,
                task_id = %previous.streaming.task_id(),
                "Cancelled existing generation before registering new one"
            );
            previous.streaming.task_id().clone()
        });

        debug!(
            session_id = %session_id,
            task_id = %streaming.task_id(),
            has_hint = hint.is_some(),
            "Registered generation"
        );
        jobs.insert(session_id.to_string(), SessionJobs { streaming, hint });
        evicted
    }

    /// Cancel and evict the generation and hint jobs for a session
    ///
    /// Returns false when nothing was registered; that is not an error.
    pub fn cancel(&self, session_id: &str) -> bool {
        let mut jobs = self.lock();
        match jobs.remove(session_id) {
            Some(entry) => {
                entry.cancel();
                debug!(session_id = %session_id, "Cancelled generation");
                true
            }
            None => false,
        }
    }

    /// Evict a session's jobs without cancelling them
    pub fn remove(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    /// Evict a session's jobs only if they still belong to `task_id`
    ///
    /// Completion paths use this so a finished task that was already
    /// replaced cannot evict its successor.
    pub fn remove_task(&self, session_id: &str, task_id: &TaskId) -> bool {
        let mut jobs = self.lock();
        let owned = jobs
            .get(session_id)
            .map(|entry| entry.streaming.task_id() == task_id)
            .unwrap_or(false);
        if owned {
            jobs.remove(session_id);
        }
        owned
    }

    /// Cancel and evict every registered job
    ///
    /// Returns the number of sessions that were cleared.
    pub fn clear(&self) -> usize {
        let mut jobs = self.lock();
        let count = jobs.len();
        for (_, entry) in jobs.drain() {
            entry.cancel();
        }
        if count > 0 {
            debug!(count, "Cleared all generations");
        }
        count
    }

    /// Task id currently registered for a session
    pub fn current_task(&self, session_id: &str) -> Option<TaskId> {
        self.lock()
            .get(session_id)
            .map(|entry| entry.streaming.task_id().clone())
    }

    /// Whether a session has a registered generation
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Number of sessions with a registered generation
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session has a registered generation
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
