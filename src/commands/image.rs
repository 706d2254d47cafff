//! Image generation command

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::chat::ChatFacade;
use crate::config::Config;
use crate::providers::{GeneratedImage, ImageParams};

/// Generate images and save inline results to `output`
///
/// Hosted results are printed as URLs.
pub async fn run_image(
    config: &Config,
    prompt: String,
    size: Option<String>,
    count: u32,
    output: &Path,
) -> Result<()> {
    let setting = config.provider.active_setting()?;
    let params = ImageParams {
        prompt,
        model: None,
        size,
        count,
    };
    tracing::info!(provider = %setting.name, count, "Generating images");

    let facade = ChatFacade::new()?;
    let result = facade.generate_image(setting, &params).await?;
    if result.images.is_empty() {
        println!("{}", "The provider returned no images.".yellow());
        return Ok(());
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    for (index, image) in result.images.iter().enumerate() {
        report_image(image, &output.join(format!("image-{}-{}.png", stamp, index + 1)))?;
    }
    Ok(())
}

fn report_image(image: &GeneratedImage, path: &Path) -> Result<()> {
    if let Some(data) = &image.data {
        std::fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved {}", path.display().to_string().green());
    }
    if let Some(url) = &image.url {
        println!("{}", url.cyan());
    }
    if let Some(revised) = &image.revised_prompt {
        println!("  {}", revised.dimmed());
    }
    Ok(())
}
