//! Notifications from the chat engine to a presentation layer

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::session::{SessionId, TaskId};

/// Something the UI may want to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A generation was registered and is starting
    Started {
        /// Session being answered
        session_id: SessionId,
        /// Task correlating the generation
        task_id: TaskId,
    },
    /// Text revealed in the answer
    Delta {
        /// Session being answered
        session_id: SessionId,
        /// Newly revealed text
        text: String,
    },
    /// Text revealed in the slow-response hint
    Hint {
        /// Session being answered
        session_id: SessionId,
        /// Newly revealed hint text
        text: String,
    },
    /// The answer finished and was saved
    Completed {
        /// Session that was answered
        session_id: SessionId,
        /// Full answer text
        content: String,
    },
    /// The generation was cancelled
    Cancelled {
        /// Session whose generation stopped
        session_id: SessionId,
    },
    /// The generation failed; `message` is user-facing
    Failed {
        /// Session whose generation failed
        session_id: SessionId,
        /// Actionable description
        message: String,
    },
}

/// Cloneable, fire-and-forget event sender
///
/// A sink without a receiver, or whose receiver was dropped, discards events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<ChatEvent>>,
}

impl EventSink {
    /// Sink connected to a new channel
    pub fn channel() -> (Self, UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Send an event, ignoring a closed receiver
    pub fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(ChatEvent::Cancelled {
            session_id: "s".into(),
        });
        EventSink::disabled().emit(ChatEvent::Cancelled {
            session_id: "s".into(),
        });
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        for text in ["a", "b"] {
            sink.emit(ChatEvent::Delta {
                session_id: "s".into(),
                text: text.into(),
            });
        }
        let first = rx.try_recv().unwrap();
        assert!(matches!(first, ChatEvent::Delta { text, .. } if text == "a"));
    }
}
