//! SQL data source backed by sqlx
//!
//! Each driver type is classified into a small set of column kinds and
//! decoded straight into [`Value`]. Anything unclassified fails the row
//! instead of being stringified on a best-effort basis.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

use super::{DataSource, DataSourceConfig, DataSourceError, Driver};
use crate::data::{QueryResult, Record, Value};
use crate::monitor::Rule;

/// MySQL options that map onto the DSN itself rather than its parameters
pub(crate) const MYSQL_CORE_OPTIONS: &[&str] = &["host", "port", "user", "password", "dbname"];

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// How a column is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int16,
    Int32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Decimal,
    Bytes,
}

enum Pool {
    Postgres(PgPool),
    Mysql(MySqlPool),
}

/// Relational database reached through a single pooled connection
///
/// The pool is capped at one connection; evaluations are serialized by the
/// checker so a second one would never be used.
pub struct SqlDataSource {
    pool: Pool,
}

impl SqlDataSource {
    /// Connect and verify the connection
    pub async fn connect(config: &DataSourceConfig) -> Result<Self, DataSourceError> {
        tracing::info!(driver = %config.driver, dsn = %config.redacted_dsn(), "Connecting to database");

        let connect_err = |source| DataSourceError::Connect {
            driver: config.driver,
            source,
        };

        let pool = match config.driver {
            Driver::Postgres => {
                let options = pg_connect_options(config)?;
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Pool::Postgres(pool)
            }
            Driver::Mysql => {
                let options = mysql_connect_options(config)?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(connect_err)?;
                Pool::Mysql(pool)
            }
        };

        tracing::info!(driver = %config.driver, "Database connection established");
        Ok(Self { pool })
    }
}

#[async_trait]
impl DataSource for SqlDataSource {
    async fn get(&self, rule: &Rule) -> Result<QueryResult, DataSourceError> {
        tracing::debug!(rule = %rule.name, query = %rule.query, "query");

        let query_err = |source| DataSourceError::Query {
            query: rule.query.clone(),
            source,
        };

        match &self.pool {
            Pool::Postgres(pool) => {
                let rows = sqlx::query(&rule.query)
                    .fetch_all(pool)
                    .await
                    .map_err(query_err)?;
                rows_to_result(&rows, &rule.query, classify_postgres, decode_postgres)
            }
            Pool::Mysql(pool) => {
                let rows = sqlx::query(&rule.query)
                    .fetch_all(pool)
                    .await
                    .map_err(query_err)?;
                rows_to_result(&rows, &rule.query, classify_mysql, decode_mysql)
            }
        }
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::Mysql(pool) => pool.close().await,
        }
        tracing::info!("Database connection closed");
        Ok(())
    }
}

fn parse_port(config: &DataSourceConfig) -> Result<Option<u16>, DataSourceError> {
    config
        .option("port")
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| DataSourceError::Option(format!("port: {}", p)))
        })
        .transpose()
}

/// Postgres options from `key=value` driver settings
pub fn pg_connect_options(config: &DataSourceConfig) -> Result<PgConnectOptions, DataSourceError> {
    let mut options = PgConnectOptions::new();
    if let Some(port) = parse_port(config)? {
        options = options.port(port);
    }

    for (key, value) in &config.options {
        options = match key.as_str() {
            "host" => options.host(value),
            "port" => options,
            "user" => options.username(value),
            "password" => options.password(value),
            "dbname" => options.database(value),
            "sslmode" => {
                let mode = PgSslMode::from_str(value)
                    .map_err(|_| DataSourceError::Option(format!("sslmode: {}", value)))?;
                options.ssl_mode(mode)
            }
            "application_name" => options.application_name(value),
            other => {
                return Err(DataSourceError::Option(format!(
                    "unsupported postgres option: {}",
                    other
                )))
            }
        };
    }

    Ok(options)
}

/// MySQL options from driver settings
pub fn mysql_connect_options(
    config: &DataSourceConfig,
) -> Result<MySqlConnectOptions, DataSourceError> {
    let mut options = MySqlConnectOptions::new().port(parse_port(config)?.unwrap_or(3306));

    for (key, value) in &config.options {
        options = match key.as_str() {
            "host" => options.host(value),
            "port" => options,
            "user" => options.username(value),
            "password" => options.password(value),
            "dbname" => options.database(value),
            "charset" => options.charset(value),
            "collation" => options.collation(value),
            "ssl-mode" | "sslmode" => {
                let mode = MySqlSslMode::from_str(value)
                    .map_err(|_| DataSourceError::Option(format!("ssl-mode: {}", value)))?;
                options.ssl_mode(mode)
            }
            other => {
                return Err(DataSourceError::Option(format!(
                    "unsupported mysql option: {}",
                    other
                )))
            }
        };
    }

    Ok(options)
}

/// Column kind for a Postgres type name
pub fn classify_postgres(type_name: &str) -> Option<ColumnKind> {
    match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => Some(ColumnKind::Text),
        "INT2" => Some(ColumnKind::Int16),
        "INT4" => Some(ColumnKind::Int32),
        "INT8" => Some(ColumnKind::Int64),
        "FLOAT4" => Some(ColumnKind::Float32),
        "FLOAT8" => Some(ColumnKind::Float64),
        "NUMERIC" => Some(ColumnKind::Decimal),
        "BYTEA" => Some(ColumnKind::Bytes),
        _ => None,
    }
}

/// Column kind for a MySQL type name
pub fn classify_mysql(type_name: &str) -> Option<ColumnKind> {
    if let Some(base) = type_name.strip_suffix(" UNSIGNED") {
        return match base {
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Some(ColumnKind::UInt64),
            _ => None,
        };
    }

    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Some(ColumnKind::Int64),
        "FLOAT" => Some(ColumnKind::Float32),
        "DOUBLE" => Some(ColumnKind::Float64),
        "DECIMAL" => Some(ColumnKind::Decimal),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
            Some(ColumnKind::Text)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            Some(ColumnKind::Bytes)
        }
        _ => None,
    }
}

/// Widen through the shortest decimal form so 0.1f32 stays 0.1
fn widen_f32(v: f32) -> f64 {
    v.to_string().parse().unwrap_or(v as f64)
}

fn decode_common<'r, R>(row: &'r R, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    i16: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    Decimal: Decode<'r, R::Database> + Type<R::Database>,
{
    let value = match kind {
        ColumnKind::Text => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
        ColumnKind::Int16 => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Value::Integer(v.into())),
        ColumnKind::Int32 => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Value::Integer(v.into())),
        ColumnKind::Int64 => row.try_get::<Option<i64>, _>(idx)?.map(Value::Integer),
        ColumnKind::Float32 => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Value::Float(widen_f32(v))),
        ColumnKind::Float64 => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        // Rendered as text so no digits are lost to f64 rounding. Values
        // `Decimal` cannot hold (NaN, beyond 28 digits) fail to decode.
        ColumnKind::Decimal => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|d| Value::Text(d.to_string())),
        ColumnKind::Bytes => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(Value::Bytes),
        ColumnKind::UInt64 => {
            return Err(sqlx::Error::ColumnDecode {
                index: idx.to_string(),
                source: "unsigned integers are not supported by this driver".into(),
            })
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

fn decode_postgres(row: &PgRow, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    decode_common(row, idx, kind)
}

fn decode_mysql(row: &MySqlRow, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    if kind != ColumnKind::UInt64 {
        return decode_common(row, idx, kind);
    }

    Ok(match row.try_get::<Option<u64>, _>(idx)? {
        None => Value::Null,
        Some(v) => match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            // Too large for i64: keep every digit as text.
            Err(_) => Value::Text(v.to_string()),
        },
    })
}

fn build_record<R>(
    row: &R,
    query: &str,
    classify: fn(&str) -> Option<ColumnKind>,
    decode: fn(&R, usize, ColumnKind) -> Result<Value, sqlx::Error>,
) -> Result<Record, DataSourceError>
where
    R: Row,
{
    let mut record = Record::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let kind = classify(type_name).ok_or_else(|| DataSourceError::UnsupportedType {
            column: column.name().to_string(),
            type_name: type_name.to_string(),
            query: query.to_string(),
        })?;

        let value = decode(row, idx, kind).map_err(|source| DataSourceError::Decode {
            column: column.name().to_string(),
            type_name: type_name.to_string(),
            query: query.to_string(),
            source,
        })?;

        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

fn rows_to_result<R>(
    rows: &[R],
    query: &str,
    classify: fn(&str) -> Option<ColumnKind>,
    decode: fn(&R, usize, ColumnKind) -> Result<Value, sqlx::Error>,
) -> Result<QueryResult, DataSourceError>
where
    R: Row,
{
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let records = rows
        .iter()
        .map(|row| build_record(row, query, classify, decode))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult::new(columns, records))
}
