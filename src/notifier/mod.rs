//! Metric and event destinations
//!
//! A notifier accepts routine metrics through `put` and alert events through
//! `event`. Notifiers are built once at startup from configuration and looked
//! up by key for every rule evaluation.

pub mod dogstatsd;
pub mod event;
pub mod log;
pub mod memory;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::metrics::Metric;
use crate::monitor::Rule;

pub use dogstatsd::{Dogstatsd, DogstatsdConfig, StatsdClient, StatsdEvent, UdpStatsdClient};
pub use event::{Event, EventLevel, EVENT_MARKER_TAG};
pub use log::{LogConfig, LogNotifier};
pub use memory::MemoryNotifier;
pub use webhook::{WebhookConfig, WebhookNotifier};

/// Destination for metrics and events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the metrics produced by one evaluation of `rule`
    async fn put(&self, metrics: &[Metric], rule: &Rule) -> Result<(), NotifierError>;

    /// Send an alert event
    async fn event(&self, event: &Event) -> Result<(), NotifierError>;
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Failed to open statsd: address = {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send to statsd: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to gauge statsd: name = {name}, value = {value}, tags = {tags:?}: {source}")]
    Gauge {
        name: String,
        value: f64,
        tags: Vec<String>,
        #[source]
        source: Box<NotifierError>,
    },

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Unknown notifier: {0}")]
    Unknown(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Notifier configurations, keyed by the name rules refer to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifiersConfig {
    /// DogStatsD agent
    #[serde(default)]
    pub dogstatsd: Option<DogstatsdConfig>,
    /// Log-only notifier
    #[serde(default)]
    pub log: Option<LogConfig>,
    /// HTTP webhook
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl NotifiersConfig {
    /// Keys of every configured notifier
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.dogstatsd.is_some() {
            keys.push(dogstatsd::KEY);
        }
        if self.log.is_some() {
            keys.push(log::KEY);
        }
        if self.webhook.is_some() {
            keys.push(webhook::KEY);
        }
        keys
    }
}

/// Registry of live notifiers, read-only once built
#[derive(Clone, Default)]
pub struct Notifiers {
    inner: HashMap<String, Arc<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured notifier
    pub async fn from_config(config: &NotifiersConfig) -> Result<Self, NotifierError> {
        let mut notifiers = Self::new();

        if let Some(c) = &config.dogstatsd {
            let client = UdpStatsdClient::connect(c).await?;
            notifiers.insert(dogstatsd::KEY, Arc::new(Dogstatsd::new(client)));
        }
        if let Some(c) = &config.log {
            notifiers.insert(log::KEY, Arc::new(LogNotifier::new(c.clone())));
        }
        if let Some(c) = &config.webhook {
            notifiers.insert(webhook::KEY, Arc::new(WebhookNotifier::new(c.clone())?));
        }

        tracing::info!(notifiers = ?notifiers.keys(), "Notifiers ready");
        Ok(notifiers)
    }

    pub fn insert(&mut self, key: impl Into<String>, notifier: Arc<dyn Notifier>) {
        self.inner.insert(key.into(), notifier);
    }

    pub fn with(mut self, key: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.insert(key, notifier);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Notifier>> {
        self.inner.get(key)
    }

    /// Look up a notifier, failing with `NotifierError::Unknown`
    pub fn resolve(&self, key: &str) -> Result<&Arc<dyn Notifier>, NotifierError> {
        self.get(key)
            .ok_or_else(|| NotifierError::Unknown(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let memory = Arc::new(MemoryNotifier::new());
        let notifiers = Notifiers::new().with("memory", memory);

        assert!(notifiers.contains("memory"));
        assert!(notifiers.resolve("memory").is_ok());
        assert!(matches!(
            notifiers.resolve("missing"),
            Err(NotifierError::Unknown(key)) if key == "missing"
        ));
        assert_eq!(notifiers.keys(), vec!["memory"]);
    }

    #[test]
    fn test_config_keys() {
        let config = NotifiersConfig {
            log: Some(LogConfig::default()),
            ..Default::default()
        };
        assert_eq!(config.keys(), vec!["log"]);
        assert!(NotifiersConfig::default().keys().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_builds_log_notifier() {
        let config = NotifiersConfig {
            log: Some(LogConfig::default()),
            ..Default::default()
        };
        let notifiers = Notifiers::from_config(&config).await.unwrap();
        assert_eq!(notifiers.len(), 1);
        assert!(notifiers.contains("log"));
    }
}
