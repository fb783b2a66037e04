//! Monitoring rule definition

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named query evaluated on a fixed interval
///
/// The metric name sent to a notifier is `name + "." + value column`,
/// prefixed by whatever namespace the notifier adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, used as the metric name prefix
    pub name: String,
    /// Evaluation interval
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// SQL executed against the data source
    pub query: String,
    /// Key of the notifier receiving the metrics
    pub notifier: String,
    /// Columns whose values become metric values
    #[serde(default)]
    pub value_cols: Vec<String>,
    /// Columns whose values become `column:value` tags
    #[serde(default)]
    pub tag_cols: Vec<String>,
}

impl Rule {
    /// Create a new rule with a one minute interval and no columns
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        notifier: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            interval: Duration::from_secs(60),
            query: query.into(),
            notifier: notifier.into(),
            value_cols: Vec::new(),
            tag_cols: Vec::new(),
        }
    }

    /// Set evaluation interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set value columns
    pub fn with_value_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.value_cols = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Set tag columns
    pub fn with_tag_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_cols = cols.into_iter().map(Into::into).collect();
        self
    }
}

/// Parse a Go-style duration such as `"1m30s"`, `"500ms"` or `"2h"`.
///
/// A bare integer is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    use regex::Regex;
    use std::sync::OnceLock;

    static UNIT_PATTERN: OnceLock<Regex> = OnceLock::new();

    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let pattern = UNIT_PATTERN.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("valid duration pattern")
    });

    let mut total = 0f64;
    let mut end = 0;
    for caps in pattern.captures_iter(s) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or_default();
        if whole.0 != end {
            return Err(format!("invalid duration: {}", input));
        }
        end = whole.1;

        let amount: f64 = caps[1]
            .parse()
            .map_err(|_| format!("invalid duration: {}", input))?;
        let unit_secs = match &caps[2] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => unreachable!("unit alternatives are fixed by the pattern"),
        };
        total += amount * unit_secs;
    }

    if end != s.len() {
        return Err(format!("invalid duration: {}", input));
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration: {}: {}", input, e))
}

/// Format a duration the way `parse_duration` reads it back
pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 || millis == 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match DurationHelper::deserialize(deserializer)? {
            DurationHelper::Secs(secs) => Ok(Duration::from_secs(secs)),
            DurationHelper::Text(text) => {
                super::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}
