//! Model listing command
//!
//! Lists the models offered by the active provider setting, as a table or
//! as JSON for scripting.

use anyhow::{Context, Result};
use prettytable::{row, Table};

use crate::chat::ChatFacade;
use crate::config::Config;
use crate::providers::ModelInfo;

/// List available models from the active provider setting
///
/// # Examples
///
/// ```no_run
/// use streamchat::config::Config;
/// use streamchat::commands::models::list_models;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load("config/config.yaml", &Default::default())?;
/// list_models(&config, false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, json: bool) -> Result<()> {
    let setting = config.provider.active_setting()?;
    tracing::info!("Listing models from provider: {}", setting.name);

    let facade = ChatFacade::new()?;
    let models = facade.list_models(setting).await?;

    if json {
        output_models_json(&models)?;
    } else if models.is_empty() {
        println!("No models available from provider: {}", setting.name);
    } else {
        output_models_table(&models, &setting.name);
    }
    Ok(())
}

fn output_models_json(models: &[ModelInfo]) -> Result<()> {
    let json = serde_json::to_string_pretty(models).context("Failed to serialize models")?;
    println!("{}", json);
    Ok(())
}

fn output_models_table(models: &[ModelInfo], provider: &str) {
    let mut table = Table::new();
    table.add_row(row!["Model Name", "Display Name", "Owned By"]);
    for model in models {
        table.add_row(row![
            model.id,
            model.display_name,
            model.owned_by.as_deref().unwrap_or("-")
        ]);
    }

    println!("\nAvailable models from {}:\n", provider);
    table.printstd();
    println!();
}
