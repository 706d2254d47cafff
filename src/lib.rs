//! StreamChat - streaming chat orchestration library
//!
//! This library streams chat completions from wire-incompatible providers
//! into one conversation model, with per-session cancellation, throttled
//! persistence of partial answers, and rollback/regenerate of the last
//! answer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `transport`: HTTP streaming reader and SSE line framing
//! - `providers`: Normalized chunk model, provider trait, OpenAI-compatible
//!   and Gemini adapters
//! - `chat`: Chat facade, streaming response consumer, regenerate planning,
//!   and the controller tying them together
//! - `session`: Task ids, cancellable job handles, and the session task registry
//! - `storage`: Persistence gateway with SQLite and in-memory backends
//! - `config`: Configuration management and validation
//! - `error`: Error taxonomy and result alias
//! - `cli`, `commands`, `logging`: Command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamchat::chat::{ChatController, ChatFacade, EventSink};
//! use streamchat::session::SessionTaskRegistry;
//! use streamchat::storage::InMemoryStore;
//! use streamchat::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let (sink, mut events) = EventSink::channel();
//!     let controller = ChatController::new(
//!         &config,
//!         Arc::new(ChatFacade::new()?),
//!         Arc::new(SessionTaskRegistry::new()),
//!         Arc::new(InMemoryStore::new()),
//!         sink,
//!     )?;
//!     if let Some(generation) = controller.send("Hello").await? {
//!         println!("{:?}", generation.wait().await);
//!     }
//!     while let Ok(event) = events.try_recv() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod providers;
pub mod session;
pub mod storage;
pub mod transport;

// Re-export commonly used types
pub use chat::{ChatController, ChatEvent, ChatFacade, GenerationOutcome};
pub use config::Config;
pub use error::{ChatError, Result};
pub use session::{SessionTaskRegistry, TaskId};
