use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Value;

/// One row of a query result, keyed by column name
pub type Record = HashMap<String, Value>;

/// Rows returned by evaluating a rule's query, in data source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names as reported by the driver
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    /// Build a result from `(column, value)` rows, taking column order from the first row.
    pub fn from_rows<I, R, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut columns = Vec::new();
        let mut records = Vec::new();

        for row in rows {
            let mut record = Record::new();
            for (key, value) in row {
                let key = key.into();
                if records.is_empty() && !columns.contains(&key) {
                    columns.push(key.clone());
                }
                record.insert(key, value.into());
            }
            records.push(record);
        }

        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
