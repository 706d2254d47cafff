//! Slow-response hint
//!
//! When typing mode is off, the consumer offers a one-shot hint after the
//! first non-empty delta. The hint is revealed with the typing cadence in
//! its own task, so the main stream is never slowed by it.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{ChatEvent, EventSink};
use crate::session::SessionId;

/// Handle to a spawned hint task
#[derive(Debug)]
pub struct SlowHint {
    trigger: Option<oneshot::Sender<()>>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SlowHint {
    /// Spawn a hint task that waits for [`SlowHint::trigger`]
    pub fn spawn(
        session_id: SessionId,
        text: String,
        delay: Duration,
        token: CancellationToken,
        sink: EventSink,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                fired = rx => if fired.is_err() { return },
            }
            tracing::debug!(session_id = %session_id, "Showing slow response hint");

            for ch in text.chars() {
                if task_token.is_cancelled() {
                    return;
                }
                sink.emit(ChatEvent::Hint {
                    session_id: session_id.clone(),
                    text: ch.to_string(),
                });
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        Self {
            trigger: Some(tx),
            token,
            handle,
        }
    }

    /// Start revealing the hint; only the first call has an effect
    pub fn trigger(&mut self) -> bool {
        match self.trigger.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Let a triggered hint finish revealing, then wait for the task
    ///
    /// An untriggered hint exits without emitting anything.
    pub async fn finish(mut self) {
        self.trigger.take();
        self.join().await;
    }

    /// Cancel the task and wait for it to exit
    pub async fn cancel(self) {
        self.token.cancel();
        self.join().await;
    }

    async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!("Slow hint task ended abnormally: {}", e);
        }
    }
}
