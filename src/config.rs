use std::env;
use std::path::PathBuf;

/// Secret used to sign session tokens when none is configured outside production.
pub const DEV_SESSION_SECRET: &str = "default-dev-secret";

/// AppConfig
///
/// Holds the application's entire configuration. Loaded once at start-up and
/// shared immutably through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Drives cookie flags and log format.
    pub env: Env,
    // Secret key used to sign and validate session tokens.
    pub session_secret: String,
    // Which database engine to open, and where.
    pub database: DatabaseTarget,
    // Pool size for the networked backend.
    pub db_max_connections: u32,
    // The single cross-origin caller allowed to send credentials.
    pub allowed_origin: String,
    // Remote object storage. `None` means uploads go to local disk.
    pub remote_storage: Option<RemoteStorageConfig>,
    // Root directory for locally stored uploads.
    pub upload_dir: PathBuf,
    pub port: u16,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Env {
    /// Reads an `APP_ENV` value; anything but `production` is local.
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("production") => Env::Production,
            _ => Env::Local,
        }
    }

    /// The environment named by `APP_ENV` in the process environment.
    pub fn current() -> Self {
        Self::from_value(env::var("APP_ENV").ok().as_deref())
    }
}

/// DatabaseTarget
///
/// The backend selected for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseTarget {
    Sqlite { path: PathBuf },
    Postgres { url: String, tls: TlsMode },
}

/// How the PostgreSQL connection negotiates TLS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsMode {
    Require,
    Disable,
    /// Leave it to the `sslmode` parameter of the connection URL.
    FromUrl,
}

/// Credentials for the S3-compatible bucket (Cloudflare R2).
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteStorageConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for RemoteStorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorageConfig")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests: local mode, SQLite file
    /// under `data/`, no remote storage.
    fn default() -> Self {
        Self {
            env: Env::Local,
            session_secret: DEV_SESSION_SECRET.to_string(),
            database: DatabaseTarget::Sqlite {
                path: PathBuf::from("data/parish.db"),
            },
            db_max_connections: 5,
            allowed_origin: "http://localhost:8080".to_string(),
            remote_storage: None,
            upload_dir: PathBuf::from("uploads"),
            port: 3000,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment.
    ///
    /// # Panics
    /// Panics if `SESSION_SECRET` is missing in production, so the service
    /// never starts with the development fallback secret.
    pub fn load() -> Self {
        Self::from_source(|key| env::var(key).ok())
    }

    /// from_source
    ///
    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let env = Env::from_value(get("APP_ENV").as_deref());

        let session_secret = match env {
            Env::Production => {
                get("SESSION_SECRET").expect("FATAL: SESSION_SECRET must be set in production.")
            }
            Env::Local => get("SESSION_SECRET").unwrap_or_else(|| {
                tracing::warn!("SESSION_SECRET not set; using the development secret");
                DEV_SESSION_SECRET.to_string()
            }),
        };

        let database = resolve_database(
            get("DATABASE_URL"),
            get("DATABASE_PATH"),
            get("DATABASE_SSL"),
        );

        let remote_storage = match (
            get("R2_ACCOUNT_ID"),
            get("R2_ACCESS_KEY_ID"),
            get("R2_SECRET_ACCESS_KEY"),
            get("R2_BUCKET"),
        ) {
            (Some(account_id), Some(access_key_id), Some(secret_access_key), Some(bucket)) => {
                Some(RemoteStorageConfig {
                    account_id,
                    access_key_id,
                    secret_access_key,
                    bucket,
                    public_base_url: get("R2_PUBLIC_BASE_URL"),
                })
            }
            _ => None,
        };

        Self {
            env,
            session_secret,
            database,
            db_max_connections: get("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.db_max_connections),
            allowed_origin: get("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
            remote_storage,
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            port: get("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == Env::Production
    }
}

/// resolve_database
///
/// `postgres://` / `postgresql://` URLs select the networked backend;
/// `sqlite:` URLs or `DATABASE_PATH` select the embedded file backend.
fn resolve_database(
    url: Option<String>,
    path: Option<String>,
    ssl_flag: Option<String>,
) -> DatabaseTarget {
    if let Some(url) = url {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            let tls = infer_tls(&url, ssl_flag.as_deref());
            return DatabaseTarget::Postgres { url, tls };
        }
        if let Some(rest) = url.strip_prefix("sqlite:") {
            let rest = rest.trim_start_matches("//");
            return DatabaseTarget::Sqlite {
                path: PathBuf::from(rest),
            };
        }
        tracing::warn!("Unrecognised DATABASE_URL scheme; falling back to SQLite");
    }

    DatabaseTarget::Sqlite {
        path: PathBuf::from(path.unwrap_or_else(|| "data/parish.db".to_string())),
    }
}

/// infer_tls
///
/// An explicit `DATABASE_SSL` flag wins, then an `sslmode` URL parameter.
/// Otherwise hosted databases (anything but loopback) require TLS.
fn infer_tls(url: &str, flag: Option<&str>) -> TlsMode {
    match flag.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1" | "require" | "yes") => return TlsMode::Require,
        Some("false" | "0" | "disable" | "no") => return TlsMode::Disable,
        _ => {}
    }

    if url.to_ascii_lowercase().contains("sslmode=") {
        return TlsMode::FromUrl;
    }

    let host = url
        .split("://")
        .nth(1)
        .map(|rest| rest.rsplit_once('@').map_or(rest, |(_, host)| host))
        .and_then(|rest| rest.split(['/', '?']).next())
        .map(|host_port| {
            if host_port.starts_with('[') {
                host_port
                    .split(']')
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('[')
            } else {
                host_port.split(':').next().unwrap_or_default()
            }
        })
        .unwrap_or_default();

    match host {
        "" | "localhost" | "127.0.0.1" | "::1" => TlsMode::Disable,
        _ => TlsMode::Require,
    }
}
