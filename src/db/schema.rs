use super::{Database, DbError, Dialect};

/// Table definitions, per dialect. `CREATE TABLE IF NOT EXISTS` keeps them
/// safe to run on every start-up.
const SQLITE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'admin',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS gallery_photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    position INTEGER,
    alt TEXT,
    storage_key TEXT,
    url TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

const POSTGRES_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'admin',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS posts (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    slug TEXT UNIQUE NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS gallery_photos (
    id BIGSERIAL PRIMARY KEY,
    filename TEXT NOT NULL,
    position BIGINT,
    alt TEXT,
    storage_key TEXT,
    url TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

/// An additive schema change for databases created by older releases.
struct Migration {
    name: &'static str,
    sqlite: Option<&'static str>,
    postgres: Option<&'static str>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "users.role",
        sqlite: Some("ALTER TABLE users ADD COLUMN role TEXT NOT NULL DEFAULT 'admin'"),
        postgres: Some("ALTER TABLE users ADD COLUMN role TEXT NOT NULL DEFAULT 'admin'"),
    },
    Migration {
        name: "gallery_photos.position",
        sqlite: Some("ALTER TABLE gallery_photos ADD COLUMN position INTEGER"),
        postgres: Some("ALTER TABLE gallery_photos ADD COLUMN position BIGINT"),
    },
    Migration {
        name: "gallery_photos.storage_key",
        sqlite: Some("ALTER TABLE gallery_photos ADD COLUMN storage_key TEXT"),
        postgres: Some("ALTER TABLE gallery_photos ADD COLUMN storage_key TEXT"),
    },
    Migration {
        name: "gallery_photos.url",
        sqlite: Some("ALTER TABLE gallery_photos ADD COLUMN url TEXT"),
        postgres: Some("ALTER TABLE gallery_photos ADD COLUMN url TEXT"),
    },
    // Millisecond positions overflow INTEGER; SQLite integers are already 64-bit.
    Migration {
        name: "gallery_photos.position bigint",
        sqlite: None,
        postgres: Some("ALTER TABLE gallery_photos ALTER COLUMN position TYPE BIGINT"),
    },
];

/// init_schema
///
/// Brings any database (fresh or created by an older release) up to the
/// current schema. Safe to run repeatedly:
///
/// 1. creates missing tables,
/// 2. applies additive migrations, ignoring only failures that mean
///    "already applied" (duplicate column/table),
/// 3. backfills null gallery positions with the row id so ordering is total,
/// 4. makes sure a superadmin exists when any account exists.
pub async fn init_schema(db: &dyn Database) -> Result<(), DbError> {
    let dialect = db.dialect();

    let tables = match dialect {
        Dialect::Sqlite => SQLITE_TABLES,
        Dialect::Postgres => POSTGRES_TABLES,
    };
    db.execute(tables).await?;

    for migration in MIGRATIONS {
        let statement = match dialect {
            Dialect::Sqlite => migration.sqlite,
            Dialect::Postgres => migration.postgres,
        };
        let Some(statement) = statement else {
            continue;
        };

        match db.execute(statement).await {
            Ok(()) => tracing::info!(migration = migration.name, "Applied schema migration"),
            Err(e) if e.is_already_applied() => {
                tracing::debug!(migration = migration.name, "Schema migration already applied")
            }
            Err(e) => {
                tracing::error!(migration = migration.name, error = %e, "Schema migration failed");
                return Err(e);
            }
        }
    }

    let backfilled = db
        .run(
            "UPDATE gallery_photos SET position = id WHERE position IS NULL",
            &[],
        )
        .await?;
    if backfilled.affected > 0 {
        tracing::info!(rows = backfilled.affected, "Backfilled gallery positions");
    }

    ensure_superadmin(db).await?;

    Ok(())
}

/// ensure_superadmin
///
/// If accounts exist but none holds `superadmin` (e.g. a database created
/// before roles existed, or the bootstrap account was removed directly in the
/// database), promotes the oldest remaining account.
pub async fn ensure_superadmin(db: &dyn Database) -> Result<(), DbError> {
    let existing = db
        .get_one(
            "SELECT COUNT(*) AS n FROM users WHERE role = 'superadmin'",
            &[],
        )
        .await?;
    let count: i64 = match existing {
        Some(row) => row.get("n")?,
        None => 0,
    };
    if count > 0 {
        return Ok(());
    }

    let oldest = db
        .get_one(
            "SELECT id, username FROM users ORDER BY created_at ASC, id ASC LIMIT 1",
            &[],
        )
        .await?;

    if let Some(row) = oldest {
        let id: i64 = row.get("id")?;
        let username: String = row.get("username")?;
        db.run(
            "UPDATE users SET role = 'superadmin' WHERE id = ?",
            &crate::params![id],
        )
        .await?;
        tracing::warn!(user_id = id, %username, "No superadmin found; promoted oldest account");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use crate::params;

    async fn column_names(db: &SqliteDatabase, table: &str) -> Vec<String> {
        db.get_all(&format!("PRAGMA table_info({table})"), &[])
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.get::<String>("name").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn running_twice_is_harmless() {
        let db = SqliteDatabase::in_memory().await.unwrap();

        init_schema(&db).await.unwrap();
        init_schema(&db).await.unwrap();

        let columns = column_names(&db, "gallery_photos").await;
        assert_eq!(
            columns,
            vec!["id", "filename", "position", "alt", "storage_key", "url", "created_at"]
        );
        assert_eq!(column_names(&db, "users").await.len(), 5);
        assert_eq!(column_names(&db, "posts").await.len(), 7);
    }

    #[tokio::test]
    async fn legacy_tables_gain_missing_columns() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE gallery_photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                alt TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )
        .await
        .unwrap();
        db.run(
            "INSERT INTO users (username, password_hash) VALUES (?, ?)",
            &params!["first", "x"],
        )
        .await
        .unwrap();
        db.run(
            "INSERT INTO users (username, password_hash) VALUES (?, ?)",
            &params!["second", "x"],
        )
        .await
        .unwrap();
        db.run(
            "INSERT INTO gallery_photos (filename) VALUES (?)",
            &params!["a.png"],
        )
        .await
        .unwrap();

        init_schema(&db).await.unwrap();

        assert!(column_names(&db, "users").await.contains(&"role".to_string()));
        assert!(
            column_names(&db, "gallery_photos")
                .await
                .contains(&"storage_key".to_string())
        );

        let photo = db
            .get_one("SELECT id, position FROM gallery_photos", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            photo.get::<i64>("position").unwrap(),
            photo.get::<i64>("id").unwrap()
        );

        let roles = db
            .get_all("SELECT username, role FROM users ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(roles[0].get::<String>("role").unwrap(), "superadmin");
        assert_eq!(roles[1].get::<String>("role").unwrap(), "admin");
    }

    #[tokio::test]
    async fn real_migration_errors_are_not_swallowed() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let err = db
            .execute("ALTER TABLE missing_table ADD COLUMN x TEXT")
            .await
            .unwrap_err();
        assert!(!err.is_already_applied());

        db.execute("CREATE TABLE t (a TEXT)").await.unwrap();
        let dup = db
            .execute("ALTER TABLE t ADD COLUMN a TEXT")
            .await
            .unwrap_err();
        assert!(dup.is_already_applied());
    }
}
