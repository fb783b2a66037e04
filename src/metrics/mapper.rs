//! Query result to metric conversion
//!
//! Every value column of every record becomes one gauge named
//! `<rule name>.<column>`, tagged with `<column>:<value>` for each tag column
//! of that same record. Output order is record order, then value column order.

use serde::{Deserialize, Serialize};

use crate::data::{QueryResult, Record, Value};
use crate::monitor::Rule;

/// A single named, tagged measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }
}

/// Metric mapping errors
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("failed to parse value as float: rule = {rule}, column = {column}, type = {type_name}, value = {raw:?}, query = {query}")]
    Value {
        rule: String,
        query: String,
        column: String,
        type_name: &'static str,
        raw: String,
    },
}

/// Convert a whole query result into metrics.
///
/// Fails on the first value that is not numeric; nothing is returned for the
/// rows that did convert.
pub fn build_metrics(result: &QueryResult, rule: &Rule) -> Result<Vec<Metric>, MappingError> {
    let mut metrics = Vec::with_capacity(result.records.len() * rule.value_cols.len());

    for record in &result.records {
        metrics.extend(build_metrics_for_record(record, rule)?);
    }

    Ok(metrics)
}

/// Convert one record into one metric per value column
pub fn build_metrics_for_record(record: &Record, rule: &Rule) -> Result<Vec<Metric>, MappingError> {
    if rule.value_cols.is_empty() {
        return Ok(Vec::new());
    }

    let tags = build_tags(record, &rule.tag_cols);
    let mut metrics = Vec::with_capacity(rule.value_cols.len());

    for column in &rule.value_cols {
        let value = coerce_value(record, column, rule)?;
        metrics.push(Metric {
            name: format!("{}.{}", rule.name, column),
            value,
            tags: tags.clone(),
        });
    }

    Ok(metrics)
}

/// Format `column:value` tags; a missing column yields an empty value.
pub fn build_tags(record: &Record, tag_cols: &[String]) -> Vec<String> {
    tag_cols
        .iter()
        .map(|column| {
            let value = record.get(column).map(Value::render).unwrap_or_default();
            format!("{}:{}", column, value)
        })
        .collect()
}

fn coerce_value(record: &Record, column: &str, rule: &Rule) -> Result<f64, MappingError> {
    let value = record.get(column).unwrap_or(&Value::Null);

    value.as_f64().ok_or_else(|| MappingError::Value {
        rule: rule.name.clone(),
        query: rule.query.clone(),
        column: column.to_string(),
        type_name: value.type_name(),
        raw: value.render(),
    })
}
