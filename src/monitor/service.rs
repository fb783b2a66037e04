//! Wiring of schedulers, queue and checker

use std::future::Future;
use std::sync::Arc;

use super::checker::{Checker, FatalError};
use super::queue::task_queue;
use super::rule::Rule;
use super::scheduler::Scheduler;
use crate::config::{Config, ConfigError};
use crate::notifier::{NotifierError, Notifiers};
use crate::source::{DataSource, DataSourceError, SqlDataSource};

/// Monitor errors
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    #[error("Unrecoverable error: {0}")]
    Fatal(#[from] FatalError),
}

/// Main monitoring process
pub struct Monitor {
    config: Config,
}

impl Monitor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connect everything and run until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S) -> Result<(), MonitorError>
    where
        S: Future<Output = ()>,
    {
        self.config.validate()?;

        let data_source = SqlDataSource::connect(&self.config.data_source).await?;
        let data_source: Arc<dyn DataSource> = Arc::new(data_source);

        let notifiers = match Notifiers::from_config(&self.config.notifiers).await {
            Ok(n) => n,
            Err(e) => {
                data_source.close().await?;
                return Err(e.into());
            }
        };

        let result = run_rules(
            Arc::clone(&data_source),
            notifiers,
            self.config.rules,
            shutdown,
        )
        .await;

        data_source.close().await?;
        result.map_err(MonitorError::from)
    }
}

/// Start one scheduler per rule and the checker, then wait.
///
/// Returns `Ok` when `shutdown` resolves first, or the checker's fatal error
/// if reporting a failure failed. A panic in the checker is re-raised here.
pub async fn run_rules<S>(
    data_source: Arc<dyn DataSource>,
    notifiers: Notifiers,
    rules: Vec<Rule>,
    shutdown: S,
) -> Result<(), FatalError>
where
    S: Future<Output = ()>,
{
    let (tx, rx) = task_queue();

    let schedulers: Vec<_> = rules
        .into_iter()
        .enumerate()
        .map(|(id, rule)| Scheduler::new(id, rule).start(tx.clone()))
        .collect();
    drop(tx);

    // Only one checker: the data source is never used concurrently.
    let mut checker = Checker::new(data_source, notifiers).start(rx);

    let outcome = tokio::select! {
        joined = &mut checker => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                tracing::error!("Checker task panicked");
                std::panic::resume_unwind(e.into_panic());
            }
            Err(e) => {
                tracing::error!(error = %e, "Checker task cancelled");
                Ok(())
            }
        },
        _ = shutdown => {
            tracing::info!("Stopping");
            checker.abort();
            Ok(())
        }
    };

    for handle in &schedulers {
        handle.abort();
    }
    futures::future::join_all(schedulers).await;

    outcome
}
