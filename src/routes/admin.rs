use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Superadmin Router Module
///
/// Account management. Wrapped in both `require_auth` and
/// `require_superadmin`; the handlers additionally take the `SuperAdmin`
/// extractor.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(handlers::list_users))
        // DELETE /admin/users/{id}
        // Refused with 400 when the target is the caller.
        .route("/admin/users/{id}", delete(handlers::delete_user))
}
