//! Command-line interface definition for StreamChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions, model
//! listing, stored history, and image generation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

/// StreamChat - streaming multi-provider chat
///
/// Chat with OpenAI-compatible or Gemini backends, cancel answers mid-stream,
/// and regenerate the last answer.
#[derive(Parser, Debug, Clone)]
#[command(name = "streamchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Override the active provider setting by name
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Override the model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Reveal answers character by character
    #[arg(long, global = true)]
    pub typing: bool,

    /// Override the history database path
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for StreamChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume a stored session (full id or 8-character prefix)
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Ask a single question and stream the answer
    Ask {
        /// The question
        prompt: String,

        /// Disable streaming and wait for the whole answer
        #[arg(long)]
        no_stream: bool,
    },

    /// Manage AI models
    Models {
        /// Model management subcommand
        #[command(subcommand)]
        command: ModelCommand,
    },

    /// Inspect stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Generate images from a prompt
    Image {
        /// Image description
        #[arg(long)]
        prompt: String,

        /// Image size such as 1024x1024
        #[arg(long)]
        size: Option<String>,

        /// Number of images
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Directory where decoded images are written
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

/// Model management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List available models
    List {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
}

/// History subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored sessions, most recent first
    List,

    /// Print the messages of a session
    Show {
        /// Session id or 8-character prefix
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session id or 8-character prefix
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Config values overridden on the command line
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            typing_mode: self.typing.then_some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["streamchat", "chat"]).unwrap();
        assert!(matches!(cli.command, Commands::Chat { resume: None }));
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_chat_with_resume() {
        let cli = Cli::try_parse_from(["streamchat", "chat", "--resume", "abcdef12"]).unwrap();
        if let Commands::Chat { resume } = cli.command {
            assert_eq!(resume.as_deref(), Some("abcdef12"));
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "streamchat",
            "ask",
            "hello",
            "--provider",
            "gemini",
            "--model",
            "gemini-1.5-pro",
            "--typing",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.provider.as_deref(), Some("gemini"));
        assert_eq!(overrides.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(overrides.typing_mode, Some(true));
    }

    #[test]
    fn test_cli_typing_absent_leaves_config_alone() {
        let cli = Cli::try_parse_from(["streamchat", "chat"]).unwrap();
        assert_eq!(cli.overrides().typing_mode, None);
    }

    #[test]
    fn test_cli_parse_ask_no_stream() {
        let cli = Cli::try_parse_from(["streamchat", "ask", "hi", "--no-stream"]).unwrap();
        if let Commands::Ask { prompt, no_stream } = cli.command {
            assert_eq!(prompt, "hi");
            assert!(no_stream);
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn test_cli_parse_models_list_json() {
        let cli = Cli::try_parse_from(["streamchat", "models", "list", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Models {
                command: ModelCommand::List { json: true }
            }
        ));
    }

    #[test]
    fn test_cli_parse_history_show() {
        let cli = Cli::try_parse_from(["streamchat", "history", "show", "abc"]).unwrap();
        if let Commands::History {
            command: HistoryCommand::Show { id },
        } = cli.command
        {
            assert_eq!(id, "abc");
        } else {
            panic!("Expected History Show command");
        }
    }

    #[test]
    fn test_cli_parse_image() {
        let cli = Cli::try_parse_from(["streamchat", "image", "--prompt", "a cat", "-n", "2"]).unwrap();
        if let Commands::Image { prompt, count, size, .. } = cli.command {
            assert_eq!(prompt, "a cat");
            assert_eq!(count, 2);
            assert!(size.is_none());
        } else {
            panic!("Expected Image command");
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["streamchat"]).is_err());
    }
}
