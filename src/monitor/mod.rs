//! Rule scheduling and evaluation
//!
//! One scheduler per rule feeds a rendezvous queue drained by a single
//! checker, so rule evaluations never overlap.

pub mod checker;
pub mod queue;
pub mod rule;
pub mod scheduler;
pub mod service;

pub use checker::{error_event, CheckError, Checker, FatalError};
pub use queue::{task_queue, QueueClosed, TaskReceiver, TaskSender};
pub use rule::{parse_duration, Rule};
pub use scheduler::Scheduler;
pub use service::{run_rules, Monitor, MonitorError};
