//! Streaming Response Consumer
//!
//! Drives one chunk stream to a terminal state:
//!
//! - `Completed`: every delta applied in arrival order, one final
//!   replace-write of the full text, session touched
//! - `Cancelled`: no final write, no error
//! - `Failed`: the error is returned to the caller
//!
//! Partial text is written back on a wall-clock throttle, so persistence
//! lag is bounded by the interval rather than by stream volume.

use std::sync::Arc;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::events::{ChatEvent, EventSink};
use super::hint::SlowHint;
use crate::config::StreamingConfig;
use crate::error::{ChatError, Result};
use crate::providers::ChunkStream;
use crate::storage::PersistenceGateway;

/// Terminal state of a consumed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The full answer, as persisted
    Completed(String),
    /// Stopped by cancellation
    Cancelled,
}

enum Drive {
    Finished,
    Cancelled,
}

/// Consumes chunk streams for one engine instance
pub struct ResponseConsumer {
    store: Arc<dyn PersistenceGateway>,
    settings: StreamingConfig,
    sink: EventSink,
}

impl std::fmt::Debug for ResponseConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseConsumer")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ResponseConsumer {
    /// Create a consumer writing to `store` and notifying `sink`
    pub fn new(store: Arc<dyn PersistenceGateway>, settings: StreamingConfig, sink: EventSink) -> Self {
        Self {
            store,
            settings,
            sink,
        }
    }

    /// Streaming settings in effect
    pub fn settings(&self) -> &StreamingConfig {
        &self.settings
    }

    /// Consume `stream` for `session_id` until it ends, fails, or `token` fires
    ///
    /// `hint_token` enables the slow-response hint when typing mode is off.
    /// The hint task is always joined before this returns: a completed
    /// answer lets a triggered hint finish, any other outcome cancels it.
    ///
    /// # Errors
    ///
    /// Returns the stream's error, a storage error, or a request error when
    /// the stream ends without any text. Cancellation is never an error.
    pub async fn consume(
        &self,
        session_id: &str,
        stream: ChunkStream,
        token: &CancellationToken,
        hint_token: Option<CancellationToken>,
    ) -> Result<ConsumeOutcome> {
        let mut hint = match hint_token {
            Some(hint_token) if !self.settings.typing_mode => Some(SlowHint::spawn(
                session_id.to_string(),
                self.settings.slow_hint_text.clone(),
                self.settings.typing_delay(),
                hint_token,
                self.sink.clone(),
            )),
            _ => None,
        };

        let mut full = String::new();
        let driven = self
            .drive(session_id, stream, token, &mut full, hint.as_mut())
            .await;

        let result = match driven {
            Ok(Drive::Finished) if !token.is_cancelled() => self.complete(session_id, full, token).await,
            Ok(_) => Ok(self.cancelled(session_id)),
            Err(e) if e.is_cancelled() || token.is_cancelled() => Ok(self.cancelled(session_id)),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    received = full.len(),
                    "Stream failed: {}",
                    e
                );
                Err(e)
            }
        };

        if let Some(hint) = hint {
            if matches!(result, Ok(ConsumeOutcome::Completed(_))) {
                hint.finish().await;
            } else {
                hint.cancel().await;
            }
        }
        result
    }

    async fn drive(
        &self,
        session_id: &str,
        mut stream: ChunkStream,
        token: &CancellationToken,
        full: &mut String,
        mut hint: Option<&mut SlowHint>,
    ) -> Result<Drive> {
        let interval = self.settings.throttle_interval();
        let mut last_write = Instant::now();

        loop {
            if token.is_cancelled() {
                return Ok(Drive::Cancelled);
            }
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Drive::Cancelled),
                next = stream.next() => next,
            };
            if token.is_cancelled() {
                return Ok(Drive::Cancelled);
            }

            let Some(chunk) = next else {
                tracing::debug!(session_id = %session_id, "Stream closed");
                return Ok(Drive::Finished);
            };
            let chunk = chunk?;

            let text = chunk.text();
            if !text.is_empty() {
                if self.settings.typing_mode {
                    if !self.reveal(session_id, &text, token, full).await {
                        return Ok(Drive::Cancelled);
                    }
                } else {
                    full.push_str(&text);
                    self.sink.emit(ChatEvent::Delta {
                        session_id: session_id.to_string(),
                        text,
                    });
                    if let Some(hint) = hint.as_deref_mut() {
                        hint.trigger();
                    }
                }

                if last_write.elapsed() >= interval {
                    self.store
                        .replace_last_assistant_message(session_id, full)
                        .await?;
                    last_write = Instant::now();
                    tracing::trace!(session_id = %session_id, len = full.len(), "Saved partial answer");
                    if token.is_cancelled() {
                        return Ok(Drive::Cancelled);
                    }
                }
            }

            if let Some(reason) = chunk.finish_reason() {
                tracing::debug!(session_id = %session_id, finish_reason = reason, "Stream finished");
                return Ok(Drive::Finished);
            }
        }
    }

    /// Apply `text` one character at a time; false if cancelled midway
    async fn reveal(
        &self,
        session_id: &str,
        text: &str,
        token: &CancellationToken,
        full: &mut String,
    ) -> bool {
        let delay = self.settings.typing_delay();
        for ch in text.chars() {
            if token.is_cancelled() {
                return false;
            }
            full.push(ch);
            self.sink.emit(ChatEvent::Delta {
                session_id: session_id.to_string(),
                text: ch.to_string(),
            });
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        true
    }

    async fn complete(
        &self,
        session_id: &str,
        full: String,
        token: &CancellationToken,
    ) -> Result<ConsumeOutcome> {
        if full.is_empty() {
            return Err(ChatError::Request(
                "provider finished without returning any text".to_string(),
            ));
        }

        self.store
            .replace_last_assistant_message(session_id, &full)
            .await?;
        if token.is_cancelled() {
            return Ok(self.cancelled(session_id));
        }
        if let Err(e) = self.store.touch_session(session_id).await {
            tracing::warn!(session_id = %session_id, "Failed to update session timestamp: {}", e);
        }

        tracing::info!(session_id = %session_id, len = full.len(), "Answer completed");
        Ok(ConsumeOutcome::Completed(full))
    }

    fn cancelled(&self, session_id: &str) -> ConsumeOutcome {
        tracing::debug!(session_id = %session_id, "Generation cancelled");
        ConsumeOutcome::Cancelled
    }
}
