//! Data sources rules are evaluated against
//!
//! A data source runs a rule's query and hands back rows whose cells have
//! already been narrowed to [`Value`](crate::data::Value). The checker is the
//! only caller and never calls concurrently.

pub mod sql;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::QueryResult;
use crate::monitor::Rule;

pub use sql::SqlDataSource;

/// Something that can evaluate a rule's query
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Execute the rule's query
    async fn get(&self, rule: &Rule) -> Result<QueryResult, DataSourceError>;

    /// Release connections
    async fn close(&self) -> Result<(), DataSourceError>;
}

/// Data source errors
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("failed to connect database: {driver}: {source}")]
    Connect {
        driver: Driver,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to query: {query}: {source}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to decode column: column = {column}, type = {type_name}, query = {query}: {source}")]
    Decode {
        column: String,
        type_name: String,
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unsupported column type: column = {column}, type = {type_name}, query = {query}")]
    UnsupportedType {
        column: String,
        type_name: String,
        query: String,
    },

    #[error("invalid data source option: {0}")]
    Option(String),
}

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Postgres,
    Mysql,
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Driver::Postgres => write!(f, "postgres"),
            Driver::Mysql => write!(f, "mysql"),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Database driver
    pub driver: Driver,
    /// Driver options such as `host`, `port`, `user`, `password`, `dbname`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl DataSourceConfig {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Data source name with the password masked, for logging
    pub fn redacted_dsn(&self) -> String {
        let masked = |k: &str, v: &str| {
            if k == "password" {
                "*****".to_string()
            } else {
                v.to_string()
            }
        };

        match self.driver {
            Driver::Postgres => self
                .options
                .iter()
                .map(|(k, v)| format!("{}={}", k, masked(k, v)))
                .collect::<Vec<_>>()
                .join(" "),
            Driver::Mysql => {
                let get = |k: &str| self.option(k).unwrap_or_default();
                let mut dsn = format!(
                    "{}:{}@tcp({}:{})/{}",
                    get("user"),
                    masked("password", get("password")),
                    get("host"),
                    self.option("port").unwrap_or("3306"),
                    get("dbname"),
                );

                let params: Vec<String> = self
                    .options
                    .iter()
                    .filter(|(k, _)| !sql::MYSQL_CORE_OPTIONS.contains(&k.as_str()))
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                if !params.is_empty() {
                    dsn.push('?');
                    dsn.push_str(&params.join("&"));
                }
                dsn
            }
        }
    }
}
