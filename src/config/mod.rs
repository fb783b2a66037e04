//! Configuration file loading and validation

pub mod env;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::monitor::Rule;
use crate::notifier::NotifiersConfig;
use crate::source::DataSourceConfig;

pub use env::{render_env, TemplateError};

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "./config/local.yml";

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database to run rule queries against
    pub data_source: DataSourceConfig,
    /// Metric and event destinations
    #[serde(default)]
    pub notifiers: NotifiersConfig,
    /// Rules to evaluate
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render template: {0}")]
    Template(#[from] TemplateError),

    #[error("failed to parse yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    /// Read, render, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading config file");

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&render_env(&contents)?)
    }

    /// Parse and validate already-rendered YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check rules against each other and against the configured notifiers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.is_empty() {
            return Err(ConfigError::Validation("no rules configured".into()));
        }

        let notifier_keys = self.notifiers.keys();
        let mut names = HashSet::new();

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(ConfigError::Validation(format!("rules[{}]: name must not be empty", i)));
            }
            if rule.query.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "rules[{}] ({}): query must not be empty",
                    i, rule.name
                )));
            }
            if rule.interval.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "rules[{}] ({}): interval must be > 0",
                    i, rule.name
                )));
            }
            if !notifier_keys.iter().any(|k| *k == rule.notifier) {
                return Err(ConfigError::Validation(format!(
                    "rules[{}] ({}): unknown notifier: {} (configured: {:?})",
                    i, rule.name, rule.notifier, notifier_keys
                )));
            }
            // Allowed, but both rules will report under the same metric names.
            if !names.insert(rule.name.as_str()) {
                tracing::warn!(rule = %rule.name, index = i, "Duplicate rule name");
            }
        }

        Ok(())
    }
}
