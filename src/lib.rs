//! sqlpulse: SQL query results as metrics
//!
//! Periodically runs configured SQL queries against a database and turns
//! the returned rows into gauge metrics for a notifier such as DogStatsD.
//!
//! # Features
//!
//! - **Rules**: a query, an interval, value columns and tag columns
//! - **Serialized checks**: one scheduler per rule, a single checker, ticks
//!   dropped while the checker is busy
//! - **Data sources**: PostgreSQL and MySQL through sqlx
//! - **Notifiers**: DogStatsD over UDP, webhook, log
//! - **Error events**: failed checks are reported through the rule's notifier
//!
//! # Example
//!
//! ```no_run
//! use sqlpulse::config::Config;
//! use sqlpulse::monitor::Monitor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("./config/local.yml")?;
//! Monitor::new(config)
//!     .run(sqlpulse::signal::shutdown_signal())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod signal;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use data::{QueryResult, Value};
pub use metrics::Metric;
pub use monitor::{Monitor, MonitorError, Rule};
pub use notifier::{Event, Notifier};
pub use source::DataSource;
