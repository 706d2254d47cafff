use anyhow::{bail, Result};
use colored::Colorize;
use prettytable::{format, Table};

use super::open_storage;
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::providers::Role;

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let storage = open_storage(config)?;

    match command {
        HistoryCommand::List => {
            let sessions = storage.list_sessions()?;

            if sessions.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Last Updated".bold()
            ]);

            for session in sessions {
                let id_short = session.id.get(..8).unwrap_or(&session.id).to_string();
                let title = if session.title.chars().count() > 40 {
                    format!("{}...", session.title.chars().take(37).collect::<String>())
                } else {
                    session.title
                };
                let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    id_short.cyan(),
                    title,
                    session.message_count,
                    updated
                ]);
            }

            println!("\nConversation History:");
            table.printstd();
            println!();
            println!(
                "Use {} to resume a session.",
                "streamchat chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            let Some(session) = storage.find_session(&id)? else {
                bail!("No stored session matches '{}'", id);
            };

            println!("\n{} ({})\n", session.title.bold(), session.id.cyan());
            for message in storage.messages(&session.id)? {
                let role = match message.role {
                    Role::User => message.role.to_string().green(),
                    Role::Assistant => message.role.to_string().blue(),
                    Role::System => message.role.to_string().yellow(),
                };
                println!("{}: {}\n", role.bold(), message.content);
            }
        }
        HistoryCommand::Delete { id } => {
            let Some(session) = storage.find_session(&id)? else {
                bail!("No stored session matches '{}'", id);
            };
            let removed = storage.delete_session(&session.id)?;
            tracing::debug!(session_id = %session.id, removed, "Deleted session");
            println!("{}", format!("Deleted conversation {}", session.id).green());
        }
    }

    Ok(())
}
