use parish_cms::{
    AppConfig,
    config::{DEV_SESSION_SECRET, DatabaseTarget, Env, TlsMode},
};
use serial_test::serial;
use std::{collections::HashMap, env, panic, path::PathBuf};

const VARS: &[&str] = &[
    "APP_ENV",
    "SESSION_SECRET",
    "DATABASE_URL",
    "DATABASE_PATH",
    "DATABASE_SSL",
    "ALLOWED_ORIGIN",
    "R2_ACCOUNT_ID",
    "R2_ACCESS_KEY_ID",
    "R2_SECRET_ACCESS_KEY",
    "R2_BUCKET",
    "R2_PUBLIC_BASE_URL",
    "UPLOAD_DIR",
    "PORT",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set (every other known variable cleared)
/// and restores the process environment afterwards, even on panic.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> =
        VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

// --- Tests ---

#[test]
#[serial]
fn test_production_without_secret_fails_fast() {
    let result = run_with_env(&[("APP_ENV", "production")], || {
        panic::catch_unwind(AppConfig::load)
    });
    assert!(
        result.is_err(),
        "Production config loading should panic without SESSION_SECRET"
    );
}

#[test]
#[serial]
fn test_local_defaults() {
    let config = run_with_env(&[], AppConfig::load);

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.session_secret, DEV_SESSION_SECRET);
    assert_eq!(
        config.database,
        DatabaseTarget::Sqlite {
            path: PathBuf::from("data/parish.db")
        }
    );
    assert_eq!(config.allowed_origin, "http://localhost:8080");
    assert_eq!(config.port, 3000);
    assert!(config.remote_storage.is_none());
}

#[test]
#[serial]
fn test_production_env_is_read() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("SESSION_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://u:p@db.example.com/parish"),
            ("ALLOWED_ORIGIN", "https://parish.example.org"),
            ("PORT", "8081"),
        ],
        AppConfig::load,
    );

    assert!(config.is_production());
    assert_eq!(config.session_secret, "s3cret");
    assert_eq!(config.allowed_origin, "https://parish.example.org");
    assert_eq!(config.port, 8081);
    assert!(matches!(
        config.database,
        DatabaseTarget::Postgres {
            tls: TlsMode::Require,
            ..
        }
    ));
}

#[test]
fn test_database_selection() {
    let sqlite = AppConfig::from_source(lookup(&[("DATABASE_PATH", "/var/lib/parish.db")]));
    assert_eq!(
        sqlite.database,
        DatabaseTarget::Sqlite {
            path: PathBuf::from("/var/lib/parish.db")
        }
    );

    let local_pg = AppConfig::from_source(lookup(&[(
        "DATABASE_URL",
        "postgres://postgres:pw@localhost:5432/parish",
    )]));
    assert!(matches!(
        local_pg.database,
        DatabaseTarget::Postgres {
            tls: TlsMode::Disable,
            ..
        }
    ));

    let forced = AppConfig::from_source(lookup(&[
        ("DATABASE_URL", "postgres://postgres:pw@localhost:5432/parish"),
        ("DATABASE_SSL", "true"),
    ]));
    assert!(matches!(
        forced.database,
        DatabaseTarget::Postgres {
            tls: TlsMode::Require,
            ..
        }
    ));
}

#[test]
fn test_remote_storage_needs_every_credential() {
    let partial = AppConfig::from_source(lookup(&[
        ("R2_ACCOUNT_ID", "acct"),
        ("R2_BUCKET", "photos"),
    ]));
    assert!(partial.remote_storage.is_none());

    let full = AppConfig::from_source(lookup(&[
        ("R2_ACCOUNT_ID", "acct"),
        ("R2_ACCESS_KEY_ID", "key"),
        ("R2_SECRET_ACCESS_KEY", "secret"),
        ("R2_BUCKET", "photos"),
    ]));
    let remote = full.remote_storage.unwrap();
    assert_eq!(remote.bucket, "photos");
    assert_eq!(remote.public_base_url, None);
    assert!(!format!("{remote:?}").contains("\"secret\""));
}

#[test]
#[serial]
fn test_environment_is_known_before_config_loads() {
    assert_eq!(run_with_env(&[("APP_ENV", "production")], Env::current), Env::Production);
    assert_eq!(run_with_env(&[], Env::current), Env::Local);
}
