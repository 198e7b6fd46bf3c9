#![cfg(feature = "postgres")]

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};

use super::{SqlConnector, SqlEndpoint, SqlValue};

/// SQL endpoint speaking the Postgres wire protocol.
pub struct PgEndpoint {
    pool: PgPool,
}

impl PgEndpoint {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // BACKUP/RESTORE hold the connection for the whole statement.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> anyhow::Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, col) in row.columns().iter().enumerate() {
        let value = match col.type_info().name() {
            "INT2" => row
                .try_get::<Option<i16>, _>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Int(v.into())),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)?
                .map_or(SqlValue::Null, SqlValue::Int),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Float(v.into())),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)?
                .map_or(SqlValue::Null, SqlValue::Float),
            _ => match row.try_get::<Option<String>, _>(i) {
                Ok(v) => v.map_or(SqlValue::Null, SqlValue::Text),
                Err(e) => {
                    tracing::debug!("column {} ({}) not decodable: {e}", col.name(), col.type_info().name());
                    SqlValue::Null
                }
            },
        };
        values.push(value);
    }
    Ok(values)
}

#[async_trait]
impl SqlEndpoint for PgEndpoint {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<u64> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query_row(&self, sql: &str, params: &[SqlValue]) -> anyhow::Result<Vec<SqlValue>> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_one(&self.pool)
            .await?;
        decode_row(&row)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connects to nodes through their `postgres://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl SqlConnector for PgConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<Box<dyn SqlEndpoint>> {
        Ok(Box::new(PgEndpoint::connect(url).await?))
    }
}
