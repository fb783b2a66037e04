//! In-memory notifier that records every call

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::event::Event;
use super::{Notifier, NotifierError};
use crate::metrics::Metric;
use crate::monitor::Rule;

/// Records puts and events; can be told to reject either
#[derive(Default)]
pub struct MemoryNotifier {
    puts: Mutex<Vec<(String, Vec<Metric>)>>,
    events: Mutex<Vec<Event>>,
    fail_put: AtomicBool,
    fail_event: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `put` calls fail
    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `event` calls fail
    pub fn fail_event(&self, fail: bool) {
        self.fail_event.store(fail, Ordering::SeqCst);
    }

    /// `(rule name, metrics)` for every successful put
    pub fn puts(&self) -> Vec<(String, Vec<Metric>)> {
        self.puts.lock().clone()
    }

    /// All metrics received, flattened in arrival order
    pub fn metrics(&self) -> Vec<Metric> {
        self.puts
            .lock()
            .iter()
            .flat_map(|(_, metrics)| metrics.iter().cloned())
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn put(&self, metrics: &[Metric], rule: &Rule) -> Result<(), NotifierError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(NotifierError::Rejected(format!("put for rule {}", rule.name)));
        }
        self.puts.lock().push((rule.name.clone(), metrics.to_vec()));
        Ok(())
    }

    async fn event(&self, event: &Event) -> Result<(), NotifierError> {
        if self.fail_event.load(Ordering::SeqCst) {
            return Err(NotifierError::Rejected(format!("event {}", event.title)));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
