//! Special commands parser for interactive chat mode
//!
//! Special commands are prefixed with `/` and are case-insensitive. They
//! act on the conversation (regenerate, switch session, show history)
//! instead of being sent to the provider.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Drop the last answer and generate it again
    Regenerate,

    /// Switch to a stored session (full id or prefix)
    Switch(String),

    /// Start a new, empty session
    New,

    /// Show the messages of the active session
    History,

    /// List stored sessions
    Sessions,

    /// Show the active session, provider, and model
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a message
    None,
}

/// Parse user input into a special command
///
/// # Examples
///
/// ```
/// use streamchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/regen").unwrap(), SpecialCommand::Regenerate);
/// assert_eq!(
///     parse_special_command("/switch AbC123").unwrap(),
///     SpecialCommand::Switch("AbC123".to_string())
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    match lower.as_str() {
        "/regen" | "/regenerate" | "/retry" => Ok(SpecialCommand::Regenerate),
        "/new" => Ok(SpecialCommand::New),
        "/history" => Ok(SpecialCommand::History),
        "/sessions" => Ok(SpecialCommand::Sessions),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),

        "/switch" => Err(CommandError::MissingArgument {
            command: "/switch".to_string(),
            usage: "/switch <session-id>".to_string(),
        }),
        input if input.starts_with("/switch ") => {
            // Keep the caller's casing for the id
            let id = trimmed["/switch ".len()..].trim();
            Ok(SpecialCommand::Switch(id.to_string()))
        }

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATION:
  /regen          - Drop the last answer and generate it again
  /new            - Start a new session
  /switch <id>    - Switch to a stored session (id or 8-char prefix)
  /history        - Show messages of the current session
  /sessions       - List stored sessions

OTHER:
  /status         - Show session, provider, and model
  /help           - Show this help
  /exit           - Leave the chat

Press Ctrl-C while an answer is streaming to cancel it.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("what is rust?").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(parse_special_command("/REGEN").unwrap(), SpecialCommand::Regenerate);
        assert_eq!(parse_special_command("  /New ").unwrap(), SpecialCommand::New);
        assert_eq!(parse_special_command("QUIT").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_switch_requires_id() {
        assert!(matches!(
            parse_special_command("/switch"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            parse_special_command("/switch  abcdef12 ").unwrap(),
            SpecialCommand::Switch("abcdef12".to_string())
        );
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_special_command("/frobnicate").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/frobnicate".to_string()));
    }
}
