//! Log-only notifier

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::event::{Event, EventLevel};
use super::{Notifier, NotifierError};
use crate::metrics::Metric;
use crate::monitor::Rule;

pub const KEY: &str = "log";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Prefix prepended to metric names in log lines
    #[serde(default)]
    pub namespace: String,
}

/// Writes metrics and events to the tracing subscriber
pub struct LogNotifier {
    config: LogConfig,
}

impl LogNotifier {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }

    fn metric_name(&self, name: &str) -> String {
        if self.config.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.config.namespace, name)
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn put(&self, metrics: &[Metric], rule: &Rule) -> Result<(), NotifierError> {
        for metric in metrics {
            tracing::info!(
                rule = %rule.name,
                metric = %self.metric_name(&metric.name),
                tags = ?metric.tags,
                value = metric.value,
                "Metric"
            );
        }
        Ok(())
    }

    async fn event(&self, event: &Event) -> Result<(), NotifierError> {
        match event.level {
            EventLevel::Error => {
                tracing::error!(title = %event.title, tags = ?event.tags, "{}", event.text)
            }
            EventLevel::Warning => {
                tracing::warn!(title = %event.title, tags = ?event.tags, "{}", event.text)
            }
            EventLevel::Info | EventLevel::Success => {
                tracing::info!(title = %event.title, tags = ?event.tags, "{}", event.text)
            }
        }
        Ok(())
    }
}
