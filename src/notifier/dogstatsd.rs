//! DogStatsD notifier
//!
//! Metrics are sent as gauges and events as DogStatsD events over UDP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use super::event::{Event, EventLevel, EVENT_MARKER_TAG};
use super::{Notifier, NotifierError};
use crate::metrics::Metric;
use crate::monitor::Rule;

/// Registry key rules use to target this notifier
pub const KEY: &str = "dogstatsd";

/// Connection settings for the DogStatsD agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DogstatsdConfig {
    /// Hostname or IP address of the agent
    pub host: String,
    /// UDP port of the agent
    pub port: String,
    /// Prefix prepended to every metric name
    #[serde(default)]
    pub namespace: String,
    /// Tags added to every call
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DogstatsdConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Event as understood by the agent
#[derive(Debug, Clone, PartialEq)]
pub struct StatsdEvent {
    pub title: String,
    pub text: String,
    pub aggregation_key: String,
    pub alert_type: EventLevel,
    pub tags: Vec<String>,
}

/// Low-level client calls the notifier needs
#[async_trait]
pub trait StatsdClient: Send + Sync {
    async fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), NotifierError>;

    async fn event(&self, event: &StatsdEvent) -> Result<(), NotifierError>;
}

/// DogStatsD client writing datagrams to a connected UDP socket
pub struct UdpStatsdClient {
    socket: UdpSocket,
    namespace: String,
    tags: Vec<String>,
}

impl UdpStatsdClient {
    pub async fn connect(config: &DogstatsdConfig) -> Result<Self, NotifierError> {
        let address = config.address();
        let connect_err = |source| NotifierError::Connect {
            address: address.clone(),
            source,
        };

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(connect_err)?;
        socket.connect(&address).await.map_err(connect_err)?;

        tracing::info!(address = %address, namespace = %config.namespace, "Connected to dogstatsd");

        Ok(Self {
            socket,
            namespace: Self::namespace_prefix(&config.namespace),
            tags: config.tags.clone(),
        })
    }

    fn namespace_prefix(namespace: &str) -> String {
        if namespace.is_empty() {
            String::new()
        } else {
            format!("{}.", namespace.trim_end_matches('.'))
        }
    }

    fn all_tags(&self, tags: &[String]) -> Vec<String> {
        let mut all = self.tags.clone();
        all.extend_from_slice(tags);
        all
    }

    /// `<ns><name>:<value>|g[|@rate][|#tags]`
    pub fn format_gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> String {
        let mut line = format!("{}{}:{}|g", self.namespace, name, value);
        if rate < 1.0 {
            line.push_str(&format!("|@{}", rate));
        }
        push_tags(&mut line, &self.all_tags(tags));
        line
    }

    /// `_e{<title len>,<text len>}:<title>|<text>|k:<key>|t:<type>[|#tags]`
    pub fn format_event(&self, event: &StatsdEvent) -> String {
        let title = escape_event_text(&event.title);
        let text = escape_event_text(&event.text);

        let mut line = format!("_e{{{},{}}}:{}|{}", title.len(), text.len(), title, text);
        if !event.aggregation_key.is_empty() {
            line.push_str(&format!("|k:{}", event.aggregation_key));
        }
        line.push_str(&format!("|t:{}", event.alert_type.as_str()));
        push_tags(&mut line, &self.all_tags(&event.tags));
        line
    }
}

fn escape_event_text(s: &str) -> String {
    s.replace('\n', "\\n")
}

fn push_tags(line: &mut String, tags: &[String]) {
    if !tags.is_empty() {
        line.push_str("|#");
        line.push_str(&tags.join(","));
    }
}

#[async_trait]
impl StatsdClient for UdpStatsdClient {
    async fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), NotifierError> {
        let line = self.format_gauge(name, value, tags, rate);
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }

    async fn event(&self, event: &StatsdEvent) -> Result<(), NotifierError> {
        let line = self.format_event(event);
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }
}

/// Notifier backed by a DogStatsD client
pub struct Dogstatsd<C: StatsdClient = UdpStatsdClient> {
    client: C,
}

impl<C: StatsdClient> Dogstatsd<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: StatsdClient> Notifier for Dogstatsd<C> {
    async fn put(&self, metrics: &[Metric], rule: &Rule) -> Result<(), NotifierError> {
        for metric in metrics {
            tracing::debug!(
                rule = %rule.name,
                metric = %metric.name,
                tags = ?metric.tags,
                value = metric.value,
                "put"
            );

            self.client
                .gauge(&metric.name, metric.value, &metric.tags, 1.0)
                .await
                .map_err(|e| NotifierError::Gauge {
                    name: metric.name.clone(),
                    value: metric.value,
                    tags: metric.tags.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    async fn event(&self, event: &Event) -> Result<(), NotifierError> {
        let statsd_event = StatsdEvent {
            title: event.title.clone(),
            text: event.text.clone(),
            aggregation_key: EVENT_MARKER_TAG.to_string(),
            alert_type: event.level,
            tags: event.tags.clone(),
        };
        self.client.event(&statsd_event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use crate::data::{QueryResult, Value};
    use crate::metrics::build_metrics;

    #[derive(Debug, Clone, PartialEq)]
    struct GaugeCall {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
    }

    /// Records calls instead of talking to an agent
    #[derive(Default)]
    struct MockStatsdClient {
        gauges: Mutex<Vec<GaugeCall>>,
        events: Mutex<Vec<StatsdEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl StatsdClient for MockStatsdClient {
        async fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), NotifierError> {
            if self.fail {
                return Err(NotifierError::Rejected("agent down".into()));
            }
            self.gauges.lock().push(GaugeCall {
                name: name.to_string(),
                value,
                tags: tags.to_vec(),
                rate,
            });
            Ok(())
        }

        async fn event(&self, event: &StatsdEvent) -> Result<(), NotifierError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    fn gauge(name: &str, value: f64, tags: &[&str]) -> GaugeCall {
        GaugeCall {
            name: name.to_string(),
            value,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            rate: 1.0,
        }
    }

    #[tokio::test]
    async fn test_put_sends_gauges() {
        let result = QueryResult::from_rows(vec![
            vec![("tag1", "hoge1"), ("val1", "1"), ("tag2", "fuga1"), ("val2", "0.1")],
            vec![("tag1", "hoge1"), ("val1", "2"), ("tag2", "fuga2"), ("val2", "0.2")],
        ]);
        let rule = Rule::new("test2", "SELECT tag1, val1, tag2, val2 FROM table1", KEY)
            .with_interval(Duration::from_secs(10))
            .with_value_cols(["val1", "val2"])
            .with_tag_cols(["tag1", "tag2"]);
        let metrics = build_metrics(&result, &rule).unwrap();

        let notifier = Dogstatsd::new(MockStatsdClient::default());
        notifier.put(&metrics, &rule).await.unwrap();

        assert_eq!(
            *notifier.client().gauges.lock(),
            vec![
                gauge("test2.val1", 1.0, &["tag1:hoge1", "tag2:fuga1"]),
                gauge("test2.val2", 0.1, &["tag1:hoge1", "tag2:fuga1"]),
                gauge("test2.val1", 2.0, &["tag1:hoge1", "tag2:fuga2"]),
                gauge("test2.val2", 0.2, &["tag1:hoge1", "tag2:fuga2"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_put_failure_names_metric() {
        let rule = Rule::new("test1", "SELECT 1", KEY).with_value_cols(["count"]);
        let result = QueryResult::from_rows(vec![vec![("count", Value::Integer(3))]]);
        let metrics = build_metrics(&result, &rule).unwrap();

        let notifier = Dogstatsd::new(MockStatsdClient {
            fail: true,
            ..Default::default()
        });
        let err = notifier.put(&metrics, &rule).await.unwrap_err();
        assert!(matches!(err, NotifierError::Gauge { ref name, .. } if name == "test1.count"));
    }

    #[tokio::test]
    async fn test_event_levels() {
        for level in [
            EventLevel::Info,
            EventLevel::Error,
            EventLevel::Warning,
            EventLevel::Success,
        ] {
            let notifier = Dogstatsd::new(MockStatsdClient::default());
            let event = Event::new(level.as_str(), "fuga")
                .with_level(level)
                .with_tag("piyo");
            notifier.event(&event).await.unwrap();

            assert_eq!(
                *notifier.client().events.lock(),
                vec![StatsdEvent {
                    title: level.as_str().to_string(),
                    text: "fuga".to_string(),
                    aggregation_key: "sqlpulse".to_string(),
                    alert_type: level,
                    tags: vec!["piyo".to_string()],
                }]
            );
        }
    }

    async fn local_client(namespace: &str, tags: &[&str]) -> (UdpStatsdClient, UdpSocket) {
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();
        let config = DogstatsdConfig {
            host: "127.0.0.1".to_string(),
            port: port.to_string(),
            namespace: namespace.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        (UdpStatsdClient::connect(&config).await.unwrap(), agent)
    }

    #[tokio::test]
    async fn test_udp_gauge_datagram() {
        let (client, agent) = local_client("sqlpulse", &["env:test"]).await;

        client
            .gauge("users.count", 3.0, &["plan:free".to_string()], 1.0)
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let n = agent.recv(&mut buf).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "sqlpulse.users.count:3|g|#env:test,plan:free"
        );
    }

    #[tokio::test]
    async fn test_format_event() {
        let (client, _agent) = local_client("", &[]).await;
        let event = StatsdEvent {
            title: "oops".to_string(),
            text: "line1\nline2".to_string(),
            aggregation_key: "sqlpulse".to_string(),
            alert_type: EventLevel::Error,
            tags: vec!["sqlpulse".to_string()],
        };

        assert_eq!(
            client.format_event(&event),
            "_e{4,12}:oops|line1\\nline2|k:sqlpulse|t:error|#sqlpulse"
        );
        assert_eq!(client.format_gauge("a.b", 0.5, &[], 0.5), "a.b:0.5|g|@0.5");
    }
}
