/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`: Interactive chat with regenerate, session switching, and Ctrl-C cancel
- `ask`: One-shot streamed question
- `models`: Model listing
- `history`: Stored conversation inspection
- `image`: Image generation

The handlers are thin wrappers over the library's chat controller, facade,
and storage.
*/

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::chat::{ChatController, ChatEvent, ChatFacade, EventSink, Generation, GenerationOutcome};
use crate::config::Config;
use crate::session::SessionTaskRegistry;
use crate::storage::SqliteStorage;

pub mod ask;
pub mod chat;
pub mod history;
pub mod image;
pub mod models;
pub mod special_commands;

/// Open the history database configured for this run
pub fn open_storage(config: &Config) -> crate::error::Result<SqliteStorage> {
    match &config.storage.db_path {
        Some(path) => SqliteStorage::new_with_path(path),
        None => SqliteStorage::new(),
    }
}

/// Controller wired to SQLite storage plus its event stream
pub(crate) struct ChatRuntime {
    pub controller: ChatController,
    pub storage: Arc<SqliteStorage>,
    pub events: UnboundedReceiver<ChatEvent>,
}

pub(crate) fn build_runtime(config: &Config) -> Result<ChatRuntime> {
    let storage = Arc::new(open_storage(config)?);
    let (sink, events) = EventSink::channel();
    let controller = ChatController::new(
        config,
        Arc::new(ChatFacade::new()?),
        Arc::new(SessionTaskRegistry::new()),
        storage.clone(),
        sink,
    )?;
    Ok(ChatRuntime {
        controller,
        storage,
        events,
    })
}

fn render_event(event: ChatEvent, hint: &mut String) {
    match event {
        ChatEvent::Delta { text, .. } => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        ChatEvent::Hint { text, .. } => hint.push_str(&text),
        _ => {}
    }
}

/// Print a generation's answer as it streams
///
/// Ctrl-C cancels the generation; the outcome is returned once the
/// generation has fully stopped.
pub(crate) async fn follow_generation(
    controller: &ChatController,
    generation: Generation,
    events: &mut UnboundedReceiver<ChatEvent>,
) -> GenerationOutcome {
    let mut hint = String::new();
    let wait = generation.wait();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            Some(event) = events.recv() => render_event(event, &mut hint),
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("Ctrl-C received, cancelling answer");
                controller.cancel();
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        render_event(event, &mut hint);
    }

    match &outcome {
        GenerationOutcome::Completed(_) => println!(),
        GenerationOutcome::Cancelled => println!("\n{}", "(cancelled)".yellow()),
        GenerationOutcome::Failed(message) => println!("\n{}", message.red()),
    }
    if !hint.is_empty() {
        println!("{}", hint.dimmed());
    }
    outcome
}
