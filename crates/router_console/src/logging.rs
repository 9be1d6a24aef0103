//! Logging system setup and configuration.
//!
//! Initializes `tracing-subscriber` with human-readable or JSON output.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. `level_override`
/// (from the command line) takes precedence over the config file.
pub fn setup_logging(
    config: &LoggingSettings,
    level_override: Option<&str>,
    json_format: bool,
) -> anyhow::Result<()> {
    let log_level = level_override.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(fmt::layer().json().with_file(false).with_line_number(false))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(false))
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}
