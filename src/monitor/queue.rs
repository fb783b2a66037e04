//! Rendezvous task queue between schedulers and the checker
//!
//! A send only completes once the checker has taken the rule, so a busy
//! checker stalls every scheduler and nothing is buffered.

use tokio::sync::{mpsc, oneshot};

use super::rule::Rule;

struct Task {
    rule: Rule,
    taken: oneshot::Sender<()>,
}

/// Producer half, cloned once per scheduler
#[derive(Clone)]
pub struct TaskSender {
    tx: mpsc::Sender<Task>,
}

/// Consumer half, owned by the single checker
pub struct TaskReceiver {
    rx: mpsc::Receiver<Task>,
}

/// Error returned when the checker side of the queue is gone
#[derive(Debug, thiserror::Error)]
#[error("task queue closed")]
pub struct QueueClosed;

/// Create a new rendezvous queue
pub fn task_queue() -> (TaskSender, TaskReceiver) {
    // The slot only carries the handoff; the sender still waits for `taken`.
    let (tx, rx) = mpsc::channel(1);
    (TaskSender { tx }, TaskReceiver { rx })
}

impl TaskSender {
    /// Hand a rule to the checker, waiting until it has been received.
    pub async fn send(&self, rule: Rule) -> Result<(), QueueClosed> {
        let (taken, ack) = oneshot::channel();
        self.tx
            .send(Task { rule, taken })
            .await
            .map_err(|_| QueueClosed)?;
        ack.await.map_err(|_| QueueClosed)
    }
}

impl TaskReceiver {
    /// Take the next rule, releasing the scheduler that sent it.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<Rule> {
        loop {
            let task = self.rx.recv().await?;
            // A sender that gave up waiting no longer counts as delivered.
            if task.taken.send(()).is_ok() {
                return Some(task.rule);
            }
        }
    }

    /// Stop accepting new rules; pending senders fail with `QueueClosed`.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
