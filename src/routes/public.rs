use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Everything a visitor of the church website needs, plus the login gateway.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the host.
        .route("/health", get(|| async { "ok" }))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        // GET /posts?page=&limit=
        .route("/posts", get(handlers::list_posts))
        .route("/posts/archives", get(handlers::get_archives))
        .route("/posts/{slug}", get(handlers::get_post_by_slug))
        .route("/gallery", get(handlers::list_gallery))
}
