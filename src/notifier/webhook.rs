//! HTTP webhook notifier

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::event::Event;
use super::{Notifier, NotifierError};
use crate::metrics::Metric;
use crate::monitor::Rule;

pub const KEY: &str = "webhook";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint receiving JSON payloads
    pub url: String,
    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Posts metrics and events as JSON
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifierError::Webhook(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn metrics_payload(metrics: &[Metric], rule: &Rule) -> serde_json::Value {
        serde_json::json!({
            "kind": "metrics",
            "rule": rule.name,
            "query": rule.query,
            "metrics": metrics,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn event_payload(event: &Event) -> serde_json::Value {
        serde_json::json!({
            "kind": "event",
            "title": event.title,
            "text": event.text,
            "level": event.level,
            "tags": event.tags,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<(), NotifierError> {
        let mut request = self.client.post(&self.config.url).json(payload);

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(url = %self.config.url, "Webhook notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn put(&self, metrics: &[Metric], rule: &Rule) -> Result<(), NotifierError> {
        if metrics.is_empty() {
            return Ok(());
        }
        self.post(&Self::metrics_payload(metrics, rule)).await
    }

    async fn event(&self, event: &Event) -> Result<(), NotifierError> {
        self.post(&Self::event_payload(event)).await
    }
}
