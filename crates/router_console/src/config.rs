//! Configuration management for the router console.
//!
//! Loads the router behaviour switches and logging settings from a TOML file.

use message_router::RouterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Router behaviour settings
    #[serde(default)]
    pub router: RouterConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            std::fs::write(path, toml_content)?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }
        self.router.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("router.toml");

        let config = AppConfig::load_from_file(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.router, RouterConfig::default());
        assert_eq!(config.logging.level, "info");

        let reloaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded.router, config.router);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[router]\nunsubscribe_failed_once = true\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert!(config.router.unsubscribe_failed_once);
        assert!(config.router.catch_panics);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

        assert!(AppConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn invalid_router_section_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("router.toml");
        std::fs::write(&path, "[router]\nmax_deferred_wildcard = 0\n").unwrap();

        let err = AppConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("max_deferred_wildcard"));
    }
}
