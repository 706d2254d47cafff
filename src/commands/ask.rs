//! One-shot question

use anyhow::{bail, Result};

use super::{build_runtime, follow_generation};
use crate::chat::GenerationOutcome;
use crate::config::Config;

/// Ask one question, stream the answer to stdout, and exit
///
/// The exchange is stored like any chat session.
pub async fn run_ask(mut config: Config, prompt: String, no_stream: bool) -> Result<()> {
    if no_stream {
        config.session.stream = false;
    }
    let mut runtime = build_runtime(&config)?;

    let Some(generation) = runtime.controller.send(&prompt).await? else {
        bail!("Prompt is empty");
    };
    tracing::debug!(session_id = %generation.session_id(), "Asking");

    match follow_generation(&runtime.controller, generation, &mut runtime.events).await {
        GenerationOutcome::Completed(_) | GenerationOutcome::Cancelled => Ok(()),
        GenerationOutcome::Failed(message) => bail!(message),
    }
}
