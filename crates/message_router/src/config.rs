//! Router behaviour configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

fn default_catch_panics() -> bool {
    true
}

fn default_warn_on_cyclic_publish() -> bool {
    true
}

fn default_max_deferred_wildcard() -> usize {
    64
}

/// Behaviour switches for a [`MessageRouter`](crate::MessageRouter).
///
/// Every field has a default, so an empty TOML table is a valid configuration:
///
/// ```toml
/// catch_panics = true
/// unsubscribe_failed_once = false
/// warn_on_cyclic_publish = true
/// max_deferred_wildcard = 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Treat a panicking subscriber like one that returned an error. When
    /// disabled, a panic unwinds through `publish` and the group is left idle.
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
    /// Remove a once-subscriber after its single invocation even when that
    /// invocation failed. Off by default: a failing once-subscriber stays
    /// subscribed and is invoked again on the next publish.
    #[serde(default)]
    pub unsubscribe_failed_once: bool,
    /// Emit a warning when a nested publish is discarded by the cyclic guard.
    /// When disabled the discard is logged at debug level.
    #[serde(default = "default_warn_on_cyclic_publish")]
    pub warn_on_cyclic_publish: bool,
    /// How many publishes nested inside a wildcard pass are delivered to
    /// wildcard subscribers once that pass ends. Further nested publishes are
    /// discarded, which bounds a wildcard subscriber that keeps publishing.
    #[serde(default = "default_max_deferred_wildcard")]
    pub max_deferred_wildcard: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            catch_panics: default_catch_panics(),
            unsubscribe_failed_once: false,
            warn_on_cyclic_publish: default_warn_on_cyclic_publish(),
            max_deferred_wildcard: default_max_deferred_wildcard(),
        }
    }
}

impl RouterConfig {
    /// Parses a configuration from TOML, filling in defaults for missing keys,
    /// and validates it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_deferred_wildcard == 0 {
            return Err(ConfigError::Invalid(
                "max_deferred_wildcard must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config = RouterConfig::from_toml_str("").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert!(config.catch_panics);
        assert!(!config.unsubscribe_failed_once);
        assert!(config.warn_on_cyclic_publish);
        assert_eq!(config.max_deferred_wildcard, 64);
    }

    #[test]
    fn overrides_are_applied() {
        let config = RouterConfig::from_toml_str(
            "catch_panics = false\nunsubscribe_failed_once = true\n",
        )
        .unwrap();
        assert!(!config.catch_panics);
        assert!(config.unsubscribe_failed_once);
        assert!(config.warn_on_cyclic_publish);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = RouterConfig::from_toml_str("catch_panics = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_wildcard_redelivery_limit_is_rejected() {
        let err = RouterConfig::from_toml_str("max_deferred_wildcard = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
