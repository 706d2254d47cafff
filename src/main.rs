//! StreamChat - streaming multi-provider chat
//!
//! Main entry point for the `streamchat` binary.

use anyhow::Result;

use streamchat::cli::{Cli, Commands, ModelCommand};
use streamchat::commands;
use streamchat::config::Config;
use streamchat::logging::{init_logging, LoggingOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&LoggingOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
        file: cli.log_file.clone(),
    })?;

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path, &cli.overrides())?;
    if let Some(db_path) = &cli.storage_path {
        tracing::info!("Using storage DB override from CLI: {}", db_path);
        config.storage.db_path = Some(db_path.clone());
    }
    config.validate()?;

    match cli.command {
        Commands::Chat { resume } => {
            tracing::info!("Starting interactive chat mode");
            commands::chat::run_chat(config, resume).await
        }
        Commands::Ask { prompt, no_stream } => {
            commands::ask::run_ask(config, prompt, no_stream).await
        }
        Commands::Models { command } => match command {
            ModelCommand::List { json } => commands::models::list_models(&config, json).await,
        },
        Commands::History { command } => commands::history::handle_history(&config, command),
        Commands::Image {
            prompt,
            size,
            count,
            output,
        } => commands::image::run_image(&config, prompt, size, count, &output).await,
    }
}
