//! Per-rule trigger source

use tokio::time::{interval, MissedTickBehavior};

use super::queue::TaskSender;
use super::rule::Rule;

/// Periodically hands one rule to the checker
pub struct Scheduler {
    id: usize,
    rule: Rule,
}

impl Scheduler {
    pub fn new(id: usize, rule: Rule) -> Self {
        Self { id, rule }
    }

    /// Run until the queue closes.
    ///
    /// The rule is sent once right away so a long interval does not leave the
    /// metric stale after a restart, then once per tick. Ticks that pass while
    /// a send is still waiting on the checker are skipped, not queued.
    pub async fn run(self, queue: TaskSender) {
        tracing::info!(scheduler = self.id, rule = %self.rule.name, "Scheduler started");

        let mut ticker = interval(self.rule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick completes immediately and doubles as the startup check.
        ticker.tick().await;
        tracing::info!(scheduler = self.id, rule = %self.rule.name, "Check on startup");
        if queue.send(self.rule.clone()).await.is_err() {
            tracing::warn!(scheduler = self.id, "Task queue closed, scheduler stopping");
            return;
        }

        loop {
            ticker.tick().await;
            tracing::debug!(scheduler = self.id, rule = %self.rule.name, "Triggered");

            if queue.send(self.rule.clone()).await.is_err() {
                tracing::warn!(scheduler = self.id, "Task queue closed, scheduler stopping");
                return;
            }
        }
    }

    /// Spawn the scheduler onto the runtime
    pub fn start(self, queue: TaskSender) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }
}
