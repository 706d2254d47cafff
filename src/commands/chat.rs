//! Interactive chat command
//!
//! A readline loop that sends input to the active session, streams the
//! answer, and handles the slash commands in [`super::special_commands`].

use anyhow::{Context, Result};
use colored::Colorize;
use prettytable::{format, row, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::{build_runtime, follow_generation, ChatRuntime};
use crate::chat::{Generation, ViewKind};
use crate::config::Config;
use crate::storage::SqliteStorage;

/// Start interactive chat
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `resume` - Stored session id (or unique prefix) to continue
pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
    let mut runtime = build_runtime(&config)?;

    if let Some(id) = resume {
        let session_id = resolve_session(&runtime.storage, &id)?;
        runtime.controller.switch_session(&session_id).await?;
        println!("Resumed session {}\n", short_id(&session_id).cyan());
        print_transcript(&runtime, &session_id);
    }

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(&config);

    loop {
        match rl.readline(&format!("{} ", ">>".green().bold())) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                let command = match parse_special_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                };

                let generation = match command {
                    SpecialCommand::Exit => break,
                    SpecialCommand::Help => {
                        print_help();
                        continue;
                    }
                    SpecialCommand::New => {
                        let session_id = runtime.controller.new_session().await?;
                        println!("Started session {}\n", short_id(&session_id).cyan());
                        continue;
                    }
                    SpecialCommand::Switch(id) => {
                        match resolve_session(&runtime.storage, &id) {
                            Ok(session_id) => {
                                runtime.controller.switch_session(&session_id).await?;
                                println!("Switched to session {}\n", short_id(&session_id).cyan());
                                print_transcript(&runtime, &session_id);
                            }
                            Err(e) => eprintln!("{}", e.to_string().red()),
                        }
                        continue;
                    }
                    SpecialCommand::History => {
                        let session_id = runtime.controller.active_session();
                        print_transcript(&runtime, &session_id);
                        continue;
                    }
                    SpecialCommand::Sessions => {
                        print_sessions(&runtime.storage)?;
                        continue;
                    }
                    SpecialCommand::ShowStatus => {
                        print_status(&runtime, &config);
                        continue;
                    }
                    SpecialCommand::Regenerate => runtime.controller.regenerate().await,
                    SpecialCommand::None => runtime.controller.send(trimmed).await,
                };

                match generation {
                    Ok(Some(generation)) => run_generation(&mut runtime, generation).await,
                    Ok(None) => println!("{}", "Nothing to regenerate.".yellow()),
                    Err(e) => eprintln!("{}", e.user_message().red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    let cancelled = runtime.controller.shutdown();
    if cancelled > 0 {
        tracing::debug!(cancelled, "Cancelled generations on exit");
    }
    println!("Goodbye!");
    Ok(())
}

async fn run_generation(runtime: &mut ChatRuntime, generation: Generation) {
    println!();
    follow_generation(&runtime.controller, generation, &mut runtime.events).await;
    println!();
}

/// Resolve a full id or unique prefix to a stored session id
fn resolve_session(storage: &SqliteStorage, id: &str) -> Result<String> {
    let session = storage
        .find_session(id)
        .context("Failed to look up session")?
        .with_context(|| format!("No stored session matches '{}'", id))?;
    Ok(session.id)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn print_welcome_banner(config: &Config) {
    println!("{}", "StreamChat".bold());
    println!(
        "Provider: {}  Model: {}",
        config.provider.active.cyan(),
        config.session.model.as_deref().unwrap_or("(provider default)").cyan()
    );
    println!("Type {} for commands, {} to leave.\n", "/help".cyan(), "exit".cyan());
}

fn print_transcript(runtime: &ChatRuntime, session_id: &str) {
    let messages = runtime.controller.messages(session_id);
    if messages.is_empty() {
        println!("{}\n", "No messages yet.".dimmed());
        return;
    }
    for message in messages {
        match message.kind {
            ViewKind::Chat => println!("{}: {}", message.role.to_string().bold(), message.content),
            ViewKind::Placeholder => println!("{}", message.content.dimmed()),
            ViewKind::Notice => println!("{}", message.content.red()),
        }
    }
    println!();
}

fn print_sessions(storage: &SqliteStorage) -> Result<()> {
    let sessions = storage.list_sessions()?;
    if sessions.is_empty() {
        println!("{}\n", "No stored sessions.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["ID".bold(), "Title".bold(), "Messages".bold()]);
    for session in sessions {
        table.add_row(row![
            short_id(&session.id).cyan(),
            session.title,
            session.message_count
        ]);
    }
    table.printstd();
    println!();
    Ok(())
}

fn print_status(runtime: &ChatRuntime, config: &Config) {
    let session_id = runtime.controller.active_session();
    println!("\n{}", "Chat Status".bold());
    println!("Session:     {}", session_id.cyan());
    println!("Provider:    {}", config.provider.active);
    println!(
        "Streaming:   {}",
        if config.session.stream { "on" } else { "off" }
    );
    println!(
        "Typing mode: {}",
        if config.streaming.typing_mode { "on" } else { "off" }
    );
    println!(
        "Generating:  {}",
        if runtime.controller.is_generating(&session_id) { "yes" } else { "no" }
    );
    println!("Storage:     {}\n", runtime.storage.path().display());
}
