//! Out-of-band alert events

use serde::{Deserialize, Serialize};

/// Tag attached to every event this process raises
pub const EVENT_MARKER_TAG: &str = "sqlpulse";

/// Severity of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    #[default]
    Info,
    Error,
    Warning,
    Success,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Error => "error",
            EventLevel::Warning => "warning",
            EventLevel::Success => "success",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "info" => Ok(EventLevel::Info),
            "error" => Ok(EventLevel::Error),
            "warning" => Ok(EventLevel::Warning),
            "success" => Ok(EventLevel::Success),
            other => Err(format!("unknown event level: {}", other)),
        }
    }
}

/// Alert-style message, distinct from routine metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub level: EventLevel,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Event {
    /// Create an info event with no tags
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            level: EventLevel::Info,
            tags: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Error event describing a failure.
    ///
    /// `text` receives the error and every source below it, one per line.
    pub fn from_error(title: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut text = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            text.push_str("\ncaused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }

        Self::new(title, text)
            .with_level(EventLevel::Error)
            .with_tag(EVENT_MARKER_TAG)
    }
}
