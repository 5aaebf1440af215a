use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;

use crate::config::DatabaseTarget;

/// Canonical text form of timestamps handed back by both backends.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database
///
/// The single data-access contract used by every service. Exactly one
/// implementation is active per process (SQLite file or PostgreSQL pool),
/// selected once in `connect` and shared as `Db`.
///
/// Statements are always parameterised and written with `?` placeholders;
/// each backend translates them to its native syntax.
#[async_trait]
pub trait Database: Send + Sync {
    /// Which SQL dialect is behind this handle. Only schema setup needs it.
    fn dialect(&self) -> Dialect;

    /// Runs DDL or administrative SQL. May contain several statements.
    async fn execute(&self, sql: &str) -> Result<(), DbError>;

    /// Runs an INSERT/UPDATE/DELETE. `generated_id` is filled for INSERTs.
    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<RunResult, DbError>;

    async fn get_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Record>, DbError>;

    async fn get_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>, DbError>;
}

/// Db
///
/// The shared, process-wide database handle.
pub type Db = Arc<dyn Database>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    pub affected: u64,
    pub generated_id: Option<i64>,
}

/// connect
///
/// Opens the backend named by the configured target. Called once at start-up.
pub async fn connect(target: &DatabaseTarget, max_connections: u32) -> Result<Db, DbError> {
    match target {
        DatabaseTarget::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Using embedded SQLite database");
            Ok(Arc::new(SqliteDatabase::open(path).await?))
        }
        DatabaseTarget::Postgres { url, tls } => {
            tracing::info!(?tls, "Using PostgreSQL database");
            Ok(Arc::new(
                PostgresDatabase::connect(url, *tls, max_connections).await?,
            ))
        }
    }
}

// --- Values ---

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Builds a `[SqlValue; N]` parameter list from anything convertible.
#[macro_export]
macro_rules! params {
    () => {
        [] as [$crate::db::SqlValue; 0]
    };
    ($($value:expr),+ $(,)?) => {
        [$($crate::db::SqlValue::from($value)),+]
    };
}

/// FromSql
///
/// Typed read of a result cell. Returns `None` when the cell cannot be
/// represented as `Self`.
pub trait FromSql: Sized {
    fn from_sql(value: &SqlValue) -> Option<Self>;
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        i64::from_sql(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Real(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        i64::from_sql(value).map(|i| i != 0)
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(i) => Some(i.to_string()),
            SqlValue::Real(f) => Some(f.to_string()),
            SqlValue::Null => None,
        }
    }
}

impl FromSql for NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

/// Accepts the canonical format plus the ISO `T` separator and fractional seconds.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

// --- Rows ---

/// Record
///
/// One result row: column names in select order with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Reads `column` as `T`. A missing column or an incompatible value is a
    /// decode error; use `Option<T>` for nullable columns.
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, DbError> {
        self.value(column)
            .and_then(T::from_sql)
            .ok_or_else(|| DbError::Decode {
                column: column.to_string(),
            })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// --- Errors ---

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("column `{column}` is missing or has an unexpected type")]
    Decode { column: String },

    #[error("could not prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    fn database_error(&self) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
        match self {
            DbError::Sqlx(sqlx::Error::Database(e)) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// True for UNIQUE / primary-key collisions on either engine.
    pub fn is_unique_violation(&self) -> bool {
        self.database_error()
            .is_some_and(|e| e.is_unique_violation())
    }

    /// True when a migration step failed only because it was already applied:
    /// PostgreSQL `duplicate_column` / `duplicate_table`, SQLite
    /// "duplicate column name" / "already exists".
    pub fn is_already_applied(&self) -> bool {
        let Some(e) = self.database_error() else {
            return false;
        };
        if let Some(code) = e.code() {
            if code == "42701" || code == "42P07" {
                return true;
            }
        }
        let message = e.message().to_ascii_lowercase();
        message.contains("duplicate column name") || message.contains("already exists")
    }
}

// --- Placeholders ---

/// Rewrites `?` placeholders to `$1..$n`, leaving quoted text untouched.
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// True for INSERT statements that do not already carry a RETURNING clause.
pub(crate) fn needs_returning_id(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let is_insert = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"));
    is_insert && !trimmed.to_ascii_lowercase().contains("returning")
}

pub(crate) fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}
