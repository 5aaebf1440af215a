use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;

// Routing, split by access level (public, authenticated, superadmin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use credentials::TokenIssuer;
pub use db::Db;
pub use error::{AppError, AppResult};
pub use services::{GalleryService, PostService, UserService};
pub use storage::{ImageStorage, MockObjectStore, RemoteBucket, S3ObjectStore, StorageState};

/// Largest request body accepted: a 4 MiB image plus base64 overhead.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// ApiDoc
///
/// OpenAPI document for the whole `/api` surface, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout, handlers::get_me, handlers::register_user,
        handlers::list_posts, handlers::get_archives, handlers::get_post_by_slug,
        handlers::list_gallery, handlers::admin_list_posts, handlers::get_post,
        handlers::create_post, handlers::update_post, handlers::delete_post,
        handlers::admin_list_gallery, handlers::upload_photo, handlers::reorder_gallery,
        handlers::update_photo, handlers::delete_photo, handlers::list_users,
        handlers::delete_user
    ),
    components(
        schemas(
            models::User, models::Post, models::PostSummary, models::GalleryPhoto,
            models::LoginRequest, models::RegisterUserRequest, models::PostRequest,
            models::CreatePhotoRequest, models::UpdatePhotoRequest, models::ReorderRequest,
            models::LoginResponse, models::SessionInfo, models::Created, models::PostSaved,
            models::MessageResponse, models::PostPreview, models::PostPage,
            models::ArchiveEntry, models::ReorderResponse, credentials::Role,
        )
    ),
    tags(
        (name = "parish-cms", description = "Church website content API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, built once at start-up and cloned cheaply
/// into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Db,
    pub storage: StorageState,
    pub tokens: TokenIssuer,
    pub posts: PostService,
    pub gallery: GalleryService,
    pub users: UserService,
}

impl AppState {
    pub fn new(config: AppConfig, db: Db, storage: ImageStorage) -> Self {
        let storage: StorageState = Arc::new(storage);
        Self {
            tokens: TokenIssuer::new(&config.session_secret),
            posts: PostService::new(db.clone()),
            gallery: GalleryService::new(db.clone(), storage.clone()),
            users: UserService::new(db.clone()),
            config: Arc::new(config),
            db,
            storage,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.as_ref().clone()
    }
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(app_state: &AppState) -> TokenIssuer {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for PostService {
    fn from_ref(app_state: &AppState) -> PostService {
        app_state.posts.clone()
    }
}

impl FromRef<AppState> for GalleryService {
    fn from_ref(app_state: &AppState) -> GalleryService {
        app_state.gallery.clone()
    }
}

impl FromRef<AppState> for UserService {
    fn from_ref(app_state: &AppState) -> UserService {
        app_state.users.clone()
    }
}

/// create_router
///
/// Assembles the `/api` routes with their access layers, the static upload
/// directory, the documentation UI and the global middleware stack.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_auth,
            )),
        )
        // The last route_layer runs first: authenticate, then check the role.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn(auth::require_superadmin))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::require_auth,
                )),
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors_layer(&state.config.allowed_origin))
}

/// cors_layer
///
/// Credentials (the session cookie) are only allowed for one configured
/// origin, so wildcards are not an option here.
fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match allowed_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(%allowed_origin, "ALLOWED_ORIGIN is not a valid header value; CORS disabled");
            cors
        }
    }
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id, so every log line of one
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
