use clap::{Parser, Subcommand};
use parish_cms::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    db::{self, schema},
    services::UserService,
    storage::{ImageStorage, RemoteBucket},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parish-cms", about = "Content backend for the parish website")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Create the bootstrap superadmin account
    Seed {
        username: String,
        password: String,
    },
}

/// main
///
/// Sets up logging, loads configuration, opens the database and either
/// serves HTTP or runs a one-off command.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // 1. Logging first, so configuration fallbacks are reported:
    //    pretty locally, JSON in production.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "parish_cms=debug,tower_http=info".into());

    match Env::current() {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // 2. Configuration (fail-fast on missing production secrets)
    let config = AppConfig::load();

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database: pick the backend once, then bring the schema up to date.
    let db = db::connect(&config.database, config.db_max_connections)
        .await
        .expect("FATAL: Failed to open the database. Check DATABASE_URL / DATABASE_PATH.");

    schema::init_schema(db.as_ref())
        .await
        .expect("FATAL: Failed to initialise the database schema.");

    if let Some(Command::Seed { username, password }) = cli.command {
        match UserService::new(db).seed(&username, &password).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, username = %user.username, role = user.role.as_str(), "Seeded account");
            }
            Err(e) => {
                tracing::error!(error = %e, "Seeding failed");
                std::process::exit(1);
            }
        }
        return;
    }

    // 4. Storage: R2 when fully configured, local disk otherwise.
    let remote = config.remote_storage.as_ref().map(RemoteBucket::from_config);
    match &remote {
        Some(_) => tracing::info!("Gallery uploads go to the R2 bucket"),
        None => tracing::info!(dir = %config.upload_dir.display(), "Gallery uploads go to local disk"),
    }
    let storage = ImageStorage::new(config.upload_dir.clone(), remote);

    // 5. State, router and server.
    let port = config.port;
    let app = create_router(AppState::new(config, db, storage));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
