use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{
    Column, Row, TypeInfo, ValueRef,
    postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode},
};
use std::str::FromStr;

use super::{
    Database, DbError, Dialect, Record, RunResult, SqlValue, TIMESTAMP_FORMAT,
    needs_returning_id, numbered_placeholders,
};
use crate::config::TlsMode;

/// PostgresDatabase
///
/// Networked backend behind a connection pool. Concurrent requests run on
/// separate connections; isolation is whatever the server defaults to.
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Connects the pool, applying the resolved TLS mode.
    pub async fn connect(url: &str, tls: TlsMode, max_connections: u32) -> Result<Self, DbError> {
        let mut options = PgConnectOptions::from_str(url)?;
        options = match tls {
            TlsMode::Require => options.ssl_mode(PgSslMode::Require),
            TlsMode::Disable => options.ssl_mode(PgSslMode::Disable),
            // `sslmode` in the URL has already been applied by the parser.
            TlsMode::FromUrl => options,
        };

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }
}

fn bind_all(params: &[SqlValue]) -> PgArguments {
    use sqlx::Arguments;

    let mut args = PgArguments::default();
    for value in params {
        // NULLs are bound as text; every nullable column written through this
        // layer is a text column.
        let _ = match value {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Integer(i) => args.add(*i),
            SqlValue::Real(f) => args.add(*f),
            SqlValue::Text(s) => args.add(s.clone()),
        };
    }
    args
}

fn decode_row(row: &PgRow) -> Result<Record, DbError> {
    let mut columns = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = column.type_info().name().to_string();
            match type_name.as_str() {
                "INT2" => SqlValue::Integer(row.try_get::<i16, _>(index)?.into()),
                "INT4" => SqlValue::Integer(row.try_get::<i32, _>(index)?.into()),
                "INT8" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                "BOOL" => SqlValue::Integer(row.try_get::<bool, _>(index)? as i64),
                "FLOAT4" => SqlValue::Real(row.try_get::<f32, _>(index)?.into()),
                "FLOAT8" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                "TIMESTAMP" => SqlValue::Text(
                    row.try_get::<NaiveDateTime, _>(index)?
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ),
                "TIMESTAMPTZ" => SqlValue::Text(
                    row.try_get::<DateTime<Utc>, _>(index)?
                        .naive_utc()
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ),
                "DATE" => SqlValue::Text(
                    row.try_get::<NaiveDate, _>(index)?
                        .format("%Y-%m-%d")
                        .to_string(),
                ),
                _ => SqlValue::Text(row.try_get::<String, _>(index)?),
            }
        };
        columns.push((column.name().to_string(), value));
    }

    Ok(Record::new(columns))
}

#[async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<RunResult, DbError> {
        let numbered = numbered_placeholders(sql);

        // PostgreSQL has no connection-independent "last insert id": ask the
        // INSERT itself to hand the key back.
        if needs_returning_id(&numbered) {
            let returning = format!("{} RETURNING id", numbered.trim_end().trim_end_matches(';'));
            let row = sqlx::query_with(&returning, bind_all(params))
                .fetch_optional(&self.pool)
                .await?;
            let generated_id = row
                .map(|r| r.try_get::<i64, _>(0))
                .transpose()?;
            return Ok(RunResult {
                affected: u64::from(generated_id.is_some()),
                generated_id,
            });
        }

        let result = sqlx::query_with(&numbered, bind_all(params))
            .execute(&self.pool)
            .await?;

        Ok(RunResult {
            affected: result.rows_affected(),
            generated_id: None,
        })
    }

    async fn get_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Record>, DbError> {
        let numbered = numbered_placeholders(sql);
        let row = sqlx::query_with(&numbered, bind_all(params))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn get_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>, DbError> {
        let numbered = numbered_placeholders(sql);
        let rows = sqlx::query_with(&numbered, bind_all(params))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}
