use async_trait::async_trait;
use sqlx::{
    Column, Row, TypeInfo, ValueRef,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};
use std::path::Path;
use std::str::FromStr;

use super::{Database, DbError, Dialect, Record, RunResult, SqlValue, is_insert};

/// SqliteDatabase
///
/// Embedded, file-backed engine. The pool holds a single connection, so every
/// statement (and in particular every write) is serialised, and each mutating
/// call is committed to the database file before it returns.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (creating if absent) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        Self::with_options(options).await
    }

    /// A private in-memory database. Lives as long as this handle.
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self, DbError> {
        // One connection: writers are serialised and an in-memory database
        // is never dropped by pool recycling.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }
}

fn bind_all<'q>(params: &[SqlValue]) -> SqliteArguments<'q> {
    use sqlx::Arguments;

    let mut args = SqliteArguments::default();
    for value in params {
        // Encoding into sqlite arguments is infallible for these types.
        let _ = match value {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Integer(i) => args.add(*i),
            SqlValue::Real(f) => args.add(*f),
            SqlValue::Text(s) => args.add(s.clone()),
        };
    }
    args
}

fn decode_row(row: &SqliteRow) -> Result<Record, DbError> {
    let mut columns = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            // SQLite is dynamically typed: dispatch on the value's storage class.
            let storage_class = raw.type_info().name().to_ascii_uppercase();
            match storage_class.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    SqlValue::Integer(row.try_get_unchecked::<i64, _>(index)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    SqlValue::Real(row.try_get_unchecked::<f64, _>(index)?)
                }
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
                    SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        columns.push((column.name().to_string(), value));
    }

    Ok(Record::new(columns))
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<(), DbError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<RunResult, DbError> {
        let result = sqlx::query_with(sql, bind_all(params))
            .execute(&self.pool)
            .await?;

        let generated_id = if is_insert(sql) && result.rows_affected() > 0 {
            Some(result.last_insert_rowid())
        } else {
            None
        };

        Ok(RunResult {
            affected: result.rows_affected(),
            generated_id,
        })
    }

    async fn get_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Record>, DbError> {
        let row = sqlx::query_with(sql, bind_all(params))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn get_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>, DbError> {
        let rows = sqlx::query_with(sql, bind_all(params))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[tokio::test]
    async fn run_reports_generated_ids_and_affected_rows() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT)")
            .await
            .unwrap();

        let first = db
            .run("INSERT INTO notes (body) VALUES (?)", &params!["a"])
            .await
            .unwrap();
        let second = db
            .run("INSERT INTO notes (body) VALUES (?)", &params!["b"])
            .await
            .unwrap();
        assert_eq!(first.generated_id, Some(1));
        assert_eq!(second.generated_id, Some(2));

        let updated = db
            .run("UPDATE notes SET body = ?", &params!["c"])
            .await
            .unwrap();
        assert_eq!(updated.affected, 2);
        assert_eq!(updated.generated_id, None);
    }

    #[tokio::test]
    async fn rows_decode_nulls_numbers_and_text() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let row = db
            .get_one("SELECT 1 AS one, NULL AS missing, 'x' AS label, 2.5 AS ratio", &[])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(row.value("one"), Some(&SqlValue::Integer(1)));
        assert_eq!(row.value("missing"), Some(&SqlValue::Null));
        assert_eq!(row.value("label"), Some(&SqlValue::Text("x".into())));
        assert_eq!(row.value("ratio"), Some(&SqlValue::Real(2.5)));
    }

    #[tokio::test]
    async fn file_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/site.db");

        {
            let db = SqliteDatabase::open(&path).await.unwrap();
            db.execute("CREATE TABLE t (v TEXT)").await.unwrap();
            db.run("INSERT INTO t (v) VALUES (?)", &params!["kept"])
                .await
                .unwrap();
        }

        let reopened = SqliteDatabase::open(&path).await.unwrap();
        let rows = reopened.get_all("SELECT v FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("v").unwrap(), "kept");
    }
}
