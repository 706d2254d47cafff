//! Logging setup for the command-line front end
//!
//! Logs go to stderr so they never interleave with answers on stdout.

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "streamchat=info";
/// Filter used with `--verbose`
pub const VERBOSE_FILTER: &str = "streamchat=debug";

/// How the binary should log
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Lower the default filter to debug
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl LoggingOptions {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn default_filter(&self) -> &'static str {
        if self.verbose {
            VERBOSE_FILTER
        } else {
            DEFAULT_FILTER
        }
    }
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the verbosity flag.
///
/// # Errors
///
/// Returns error if the log file cannot be opened or a subscriber is
/// already installed
pub fn init_logging(options: &LoggingOptions) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.default_filter()))?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &options.file {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    if options.json {
        let stderr_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr);
        let file_layer = file.map(|file| fmt::layer().json().with_writer(file));
        registry.with(stderr_layer).with(file_layer).try_init()?;
    } else {
        let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
        let file_layer = file.map(|file| fmt::layer().with_ansi(false).with_writer(file));
        registry.with(stderr_layer).with(file_layer).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_follows_verbosity() {
        assert_eq!(LoggingOptions::default().default_filter(), DEFAULT_FILTER);
        let verbose = LoggingOptions {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(verbose.default_filter(), VERBOSE_FILTER);
    }
}
