pub mod script;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use script::ImportScript;

#[cfg(feature = "postgres")]
pub use postgres::{PgConnector, PgEndpoint};

use std::fmt;

use async_trait::async_trait;

/// A bound parameter or a returned column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Integer view of the value. Text columns holding a number are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Float(v) => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(v) => write!(f, "{v}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// An open connection to one node's SQL interface.
///
/// Statements use the server's native `$n` placeholders; values are always
/// bound, never interpolated.
#[async_trait]
pub trait SqlEndpoint: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<u64>;

    /// Execute a statement that returns exactly one row.
    async fn query_row(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<Vec<SqlValue>>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);
}

/// Opens SQL connections from a node's connection URL.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn SqlEndpoint>>;
}

/// Quote an SQL identifier (database or table name).
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Data size reported by a BACKUP or RESTORE result row: its last column.
pub fn reported_data_size(row: &[SqlValue]) -> anyhow::Result<u64> {
    let last = row
        .last()
        .ok_or_else(|| anyhow::anyhow!("statement returned an empty row"))?;
    let size = last
        .as_i64()
        .ok_or_else(|| anyhow::anyhow!("data size column is not an integer: {last}"))?;
    u64::try_from(size).map_err(|_| anyhow::anyhow!("negative data size: {size}"))
}
