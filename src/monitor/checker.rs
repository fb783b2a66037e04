//! Serialized rule evaluation worker

use std::sync::Arc;

use super::queue::TaskReceiver;
use super::rule::Rule;
use crate::metrics::{build_metrics, MappingError};
use crate::notifier::{Event, Notifiers, NotifierError};
use crate::source::{DataSource, DataSourceError};

/// The single worker that evaluates rules one at a time
///
/// Schedulers hand rules over through a rendezvous queue, so at most one
/// evaluation is ever in flight and the data source sees a single caller.
pub struct Checker {
    data_source: Arc<dyn DataSource>,
    notifiers: Notifiers,
}

/// Errors from a single evaluation, reported as events
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("query failed: {0}")]
    Query(#[from] DataSourceError),

    #[error("metric mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("notifier put failed: {0}")]
    Put(#[source] NotifierError),

    #[error("notifier not found: {0}")]
    UnknownNotifier(String),
}

impl CheckError {
    /// Short label used in event titles
    pub fn summary(&self) -> &'static str {
        match self {
            CheckError::Query(DataSourceError::UnsupportedType { .. }) => "unsupported column type",
            CheckError::Query(DataSourceError::Decode { .. }) => "failed to decode column",
            CheckError::Query(_) => "query failed",
            CheckError::Mapping(_) => "value is not numeric",
            CheckError::Put(_) => "failed to send metrics",
            CheckError::UnknownNotifier(_) => "notifier not found",
        }
    }
}

/// An evaluation failed and the failure could not be reported either
#[derive(Debug, thiserror::Error)]
#[error("failed to report error for rule {rule}: {source} (original error: {original})")]
pub struct FatalError {
    pub rule: String,
    pub original: String,
    #[source]
    pub source: NotifierError,
}

impl Checker {
    pub fn new(data_source: Arc<dyn DataSource>, notifiers: Notifiers) -> Self {
        Self {
            data_source,
            notifiers,
        }
    }

    /// Process rules until the queue closes.
    ///
    /// Returns `Err` only when an error event could not be delivered; the
    /// caller is expected to terminate the process in that case.
    pub async fn run(&self, mut queue: TaskReceiver) -> Result<(), FatalError> {
        tracing::info!("Checker started");

        while let Some(rule) = queue.recv().await {
            tracing::info!(rule = %rule.name, "check");

            if let Err(e) = self.check(&rule).await {
                tracing::error!(rule = %rule.name, error = %e, "Check failed");
                self.report(&rule, &e).await?;
            }
        }

        tracing::info!("Task queue closed, checker stopping");
        Ok(())
    }

    /// Spawn the checker onto the runtime
    pub fn start(self, queue: TaskReceiver) -> tokio::task::JoinHandle<Result<(), FatalError>> {
        tokio::spawn(async move { self.run(queue).await })
    }

    /// Query, map and send metrics for one rule
    pub async fn check(&self, rule: &Rule) -> Result<(), CheckError> {
        let result = self.data_source.get(rule).await?;
        let metrics = build_metrics(&result, rule)?;

        let notifier = self
            .notifiers
            .get(&rule.notifier)
            .ok_or_else(|| CheckError::UnknownNotifier(rule.notifier.clone()))?;

        tracing::debug!(
            rule = %rule.name,
            records = result.len(),
            metrics = metrics.len(),
            "put"
        );
        notifier.put(&metrics, rule).await.map_err(CheckError::Put)
    }

    /// Send an error event for a failed check through the rule's notifier
    pub async fn report(&self, rule: &Rule, error: &CheckError) -> Result<(), FatalError> {
        let event = error_event(rule, error);

        let fatal = |source| FatalError {
            rule: rule.name.clone(),
            original: error.to_string(),
            source,
        };

        let notifier = self.notifiers.resolve(&rule.notifier).map_err(fatal)?;
        notifier.event(&event).await.map_err(fatal)
    }
}

/// Event describing a failed check
pub fn error_event(rule: &Rule, error: &CheckError) -> Event {
    Event::from_error(
        format!("sqlpulse: {}: {}", rule.name, error.summary()),
        error,
    )
    .with_tag(format!("rule:{}", rule.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{QueryResult, Value};
    use crate::monitor::queue::task_queue;
    use crate::monitor::scheduler::Scheduler;
    use crate::notifier::{EventLevel, MemoryNotifier, EVENT_MARKER_TAG};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers queries from a fixed table and tracks concurrent callers
    #[derive(Default)]
    struct ScriptedSource {
        results: HashMap<String, QueryResult>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn with_result(mut self, query: &str, result: QueryResult) -> Self {
            self.results.insert(query.to_string(), result);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls_for(&self, name: &str) -> usize {
            self.calls.lock().iter().filter(|n| *n == name).count()
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        async fn get(&self, rule: &Rule) -> Result<QueryResult, DataSourceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().push(rule.name.clone());

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.results
                .get(&rule.query)
                .cloned()
                .ok_or_else(|| DataSourceError::UnsupportedType {
                    column: "c".into(),
                    type_name: "TIMESTAMPTZ".into(),
                    query: rule.query.clone(),
                })
        }

        async fn close(&self) -> Result<(), DataSourceError> {
            Ok(())
        }
    }

    fn count_result(n: i64) -> QueryResult {
        QueryResult::from_rows(vec![vec![("count", Value::Integer(n))]])
    }

    fn count_rule(name: &str, query: &str) -> Rule {
        Rule::new(name, query, "memory").with_value_cols(["count"])
    }

    fn setup(source: ScriptedSource) -> (Checker, Arc<ScriptedSource>, Arc<MemoryNotifier>) {
        let source = Arc::new(source);
        let memory = Arc::new(MemoryNotifier::new());
        let notifiers = Notifiers::new().with("memory", memory.clone());
        (Checker::new(source.clone(), notifiers), source, memory)
    }

    #[tokio::test]
    async fn test_check_puts_metrics() {
        let (checker, _, memory) =
            setup(ScriptedSource::default().with_result("SELECT count", count_result(3)));

        checker
            .check(&count_rule("test1", "SELECT count"))
            .await
            .unwrap();

        let metrics = memory.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "test1.count");
        assert_eq!(metrics[0].value, 3.0);
        assert!(memory.events().is_empty());
    }

    #[tokio::test]
    async fn test_query_error_becomes_event() {
        let (checker, source, memory) = setup(ScriptedSource::default());
        let (tx, rx) = task_queue();

        let handle = tokio::spawn(async move { checker.run(rx).await });
        tx.send(count_rule("broken", "SELECT missing")).await.unwrap();
        drop(tx);

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(source.calls_for("broken"), 1);

        let events = memory.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Error);
        assert!(events[0].title.contains("broken"));
        assert!(events[0].title.contains("unsupported column type"));
        assert!(events[0].text.contains("TIMESTAMPTZ"));
        assert!(events[0].tags.contains(&EVENT_MARKER_TAG.to_string()));
    }

    #[tokio::test]
    async fn test_mapping_error_becomes_event() {
        let bad = QueryResult::from_rows(vec![vec![("count", "abc")]]);
        let (checker, _, memory) =
            setup(ScriptedSource::default().with_result("SELECT bad", bad));

        let rule = count_rule("bad", "SELECT bad");
        let err = checker.check(&rule).await.unwrap_err();
        assert!(matches!(err, CheckError::Mapping(_)));
        checker.report(&rule, &err).await.unwrap();

        assert!(memory.puts().is_empty());
        assert!(memory.events()[0].text.contains("abc"));
    }

    #[tokio::test]
    async fn test_put_failure_reported_and_loop_continues() {
        let (checker, source, memory) = setup(
            ScriptedSource::default()
                .with_result("SELECT a", count_result(1))
                .with_result("SELECT b", count_result(2)),
        );
        memory.fail_put(true);

        let (tx, rx) = task_queue();
        let handle = tokio::spawn(async move { checker.run(rx).await });

        tx.send(count_rule("a", "SELECT a")).await.unwrap();
        tx.send(count_rule("b", "SELECT b")).await.unwrap();
        drop(tx);

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(source.calls_for("a"), 1);
        assert_eq!(source.calls_for("b"), 1);

        let events = memory.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].title.contains("failed to send metrics"));
    }

    #[tokio::test]
    async fn test_event_failure_is_fatal() {
        let (checker, _, memory) =
            setup(ScriptedSource::default().with_result("SELECT a", count_result(1)));
        memory.fail_put(true);
        memory.fail_event(true);

        let (tx, rx) = task_queue();
        let handle = tokio::spawn(async move { checker.run(rx).await });
        tx.send(count_rule("a", "SELECT a")).await.unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.rule, "a");
        assert!(err.original.contains("notifier put failed"));

        // Nobody is receiving any more.
        assert!(tx.send(count_rule("a", "SELECT a")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_notifier_is_fatal() {
        let (checker, _, _) =
            setup(ScriptedSource::default().with_result("SELECT a", count_result(1)));
        let rule = Rule::new("a", "SELECT a", "nowhere").with_value_cols(["count"]);

        let err = checker.check(&rule).await.unwrap_err();
        assert!(matches!(err, CheckError::UnknownNotifier(_)));
        assert!(checker.report(&rule, &err).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_checks_are_serialized() {
        let source = ScriptedSource::default()
            .with_result("SELECT fast", count_result(1))
            .with_result("SELECT medium", count_result(2))
            .with_result("SELECT slow", count_result(3))
            .with_delay(Duration::from_secs(3));
        let (checker, source, memory) = setup(source);

        let (tx, rx) = task_queue();
        let intervals = [("fast", 1), ("medium", 5), ("slow", 10)];
        for (id, (name, secs)) in intervals.iter().enumerate() {
            let rule = count_rule(name, &format!("SELECT {}", name))
                .with_interval(Duration::from_secs(*secs));
            Scheduler::new(id, rule).start(tx.clone());
        }
        drop(tx);
        let handle = checker.start(rx);

        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.abort();

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        // Each check takes 3s, so 60s fits at most 20 of them across all rules.
        let total = source.calls.lock().len();
        assert!(total <= 21, "total checks = {}", total);

        // Waiting schedulers are served in turn, so no rule is starved.
        for name in ["fast", "medium", "slow"] {
            assert!(source.calls_for(name) >= 1, "{} never checked", name);
        }

        assert!(memory.events().is_empty());
    }
}
