use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// The content dashboard. Every handler here can rely on `require_auth`
/// having validated the session and attached the caller's `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/auth/me", get(handlers::get_me))
        // POST /auth/register
        // Only existing admins can create accounts; there is no open sign-up.
        .route("/auth/register", post(handlers::register_user))
        // --- Posts ---
        .route(
            "/admin/posts",
            get(handlers::admin_list_posts).post(handlers::create_post),
        )
        .route(
            "/admin/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        // --- Gallery ---
        .route(
            "/admin/gallery",
            get(handlers::admin_list_gallery).post(handlers::upload_photo),
        )
        // PUT /admin/gallery/order
        // Full reorder; positions become 1..N in the order given.
        .route("/admin/gallery/order", put(handlers::reorder_gallery))
        .route(
            "/admin/gallery/{id}",
            axum::routing::patch(handlers::update_photo).delete(handlers::delete_photo),
        )
}
