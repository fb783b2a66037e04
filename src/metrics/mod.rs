//! Metrics derived from query results

pub mod mapper;

pub use mapper::{build_metrics, build_metrics_for_record, build_tags, MappingError, Metric};
