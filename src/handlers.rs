use crate::{
    auth::{AuthUser, SuperAdmin, clear_session_cookie, session_cookie},
    config::AppConfig,
    credentials::TokenIssuer,
    error::AppResult,
    extract::JsonBody,
    models::{
        ArchiveEntry, CreatePhotoRequest, Created, GalleryPhoto, LoginRequest, LoginResponse,
        MessageResponse, Post, PostPage, PostRequest, PostSaved, PostSummary, RegisterUserRequest,
        ReorderRequest, ReorderResponse, SessionInfo, UpdatePhotoRequest, User,
    },
    services::{GalleryService, Pagination, PostService, UserService},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

// --- Query Structs ---

/// PageQuery
///
/// Query parameters of the public post listing. Kept as raw strings so that
/// junk values fall back to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Posts per page, 1 to 20 (default 5).
    pub limit: Option<String>,
}

// --- Session Handlers ---

/// login
///
/// [Public Route] Checks the credentials, sets the `token` cookie and also
/// returns the token for bearer-header clients.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(users): State<UserService>,
    State(tokens): State<TokenIssuer>,
    State(config): State<AppConfig>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = tokens.issue(user.id, &user.username, user.role)?;

    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    let cookie = session_cookie(&token, config.env);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            message: "Login successful".into(),
            username: user.username,
            role: user.role,
            token,
        }),
    ))
}

/// logout
///
/// [Public Route] Clears the session cookie.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(State(config): State<AppConfig>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(config.env))],
        Json(MessageResponse::new("Logged out")),
    )
}

/// get_me
///
/// [Authenticated Route] Identity carried by the caller's token.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current session", body = SessionInfo),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_me(user: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: user.id,
        username: user.username,
        role: user.role,
    })
}

/// register_user
///
/// [Authenticated Route] Any logged-in admin may add another admin account.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User created", body = Created),
        (status = 400, description = "Invalid username or password"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn register_user(
    caller: AuthUser,
    State(users): State<UserService>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<Created>)> {
    let user = users.register(&payload.username, &payload.password).await?;
    tracing::debug!(created_by = caller.id, user_id = user.id, "Registration complete");
    Ok((
        StatusCode::CREATED,
        Json(Created {
            message: "User created".into(),
            id: user.id,
        }),
    ))
}

// --- Public Content ---

/// list_posts
///
/// [Public Route] One page of posts, newest first, each with a text preview.
#[utoipa::path(
    get,
    path = "/api/posts",
    params(PageQuery),
    responses((status = 200, description = "Page of posts", body = PostPage))
)]
pub async fn list_posts(
    State(posts): State<PostService>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<PostPage>> {
    let pagination = Pagination::from_query(query.page.as_deref(), query.limit.as_deref());
    Ok(Json(posts.list_page(pagination).await?))
}

/// get_archives
///
/// [Public Route] Post counts per month.
#[utoipa::path(
    get,
    path = "/api/posts/archives",
    responses((status = 200, description = "Monthly archive", body = [ArchiveEntry]))
)]
pub async fn get_archives(State(posts): State<PostService>) -> AppResult<Json<Vec<ArchiveEntry>>> {
    Ok(Json(posts.archives().await?))
}

/// get_post_by_slug
#[utoipa::path(
    get,
    path = "/api/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post_by_slug(
    State(posts): State<PostService>,
    Path(slug): Path<String>,
) -> AppResult<Json<Post>> {
    Ok(Json(posts.get_by_slug(&slug).await?))
}

/// list_gallery
///
/// [Public Route] All photos in display order.
#[utoipa::path(
    get,
    path = "/api/gallery",
    responses((status = 200, description = "Gallery", body = [GalleryPhoto]))
)]
pub async fn list_gallery(
    State(gallery): State<GalleryService>,
) -> AppResult<Json<Vec<GalleryPhoto>>> {
    Ok(Json(gallery.list().await?))
}

// --- Post Administration ---

/// admin_list_posts
///
/// [Authenticated Route] Every post, without bodies, for the dashboard.
#[utoipa::path(
    get,
    path = "/api/admin/posts",
    responses((status = 200, description = "All posts", body = [PostSummary]))
)]
pub async fn admin_list_posts(
    State(posts): State<PostService>,
) -> AppResult<Json<Vec<PostSummary>>> {
    Ok(Json(posts.list_all().await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    State(posts): State<PostService>,
    Path(id): Path<i64>,
) -> AppResult<Json<Post>> {
    Ok(Json(posts.get_by_id(id).await?))
}

/// create_post
///
/// [Authenticated Route] The slug is derived from the title and must be free.
#[utoipa::path(
    post,
    path = "/api/admin/posts",
    request_body = PostRequest,
    responses(
        (status = 201, description = "Post created", body = PostSaved),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn create_post(
    State(posts): State<PostService>,
    JsonBody(payload): JsonBody<PostRequest>,
) -> AppResult<(StatusCode, Json<PostSaved>)> {
    let (id, slug) = posts.create(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(PostSaved {
            message: "Post created".into(),
            id,
            slug,
        }),
    ))
}

/// update_post
///
/// [Authenticated Route] Replaces the post; the slug is recomputed from the
/// new title and re-checked against other posts.
#[utoipa::path(
    put,
    path = "/api/admin/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    request_body = PostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostSaved),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Slug already taken")
    )
)]
pub async fn update_post(
    State(posts): State<PostService>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<PostRequest>,
) -> AppResult<Json<PostSaved>> {
    let slug = posts.update(id, &payload).await?;
    Ok(Json(PostSaved {
        message: "Post updated".into(),
        id,
        slug,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/admin/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    State(posts): State<PostService>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    posts.delete(id).await?;
    Ok(Json(MessageResponse::new("Post deleted")))
}

// --- Gallery Administration ---

#[utoipa::path(
    get,
    path = "/api/admin/gallery",
    responses((status = 200, description = "Gallery", body = [GalleryPhoto]))
)]
pub async fn admin_list_gallery(
    State(gallery): State<GalleryService>,
) -> AppResult<Json<Vec<GalleryPhoto>>> {
    Ok(Json(gallery.list().await?))
}

/// upload_photo
///
/// [Authenticated Route] Accepts a base64 data URL (PNG, JPEG or WebP, at
/// most 4 MiB decoded). The new photo goes to the end of the gallery.
#[utoipa::path(
    post,
    path = "/api/admin/gallery",
    request_body = CreatePhotoRequest,
    responses(
        (status = 201, description = "Photo uploaded", body = Created),
        (status = 400, description = "Invalid image data"),
        (status = 413, description = "Image too large")
    )
)]
pub async fn upload_photo(
    State(gallery): State<GalleryService>,
    JsonBody(payload): JsonBody<CreatePhotoRequest>,
) -> AppResult<(StatusCode, Json<Created>)> {
    let id = gallery
        .create(&payload.image, payload.alt.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Created {
            message: "Photo uploaded".into(),
            id,
        }),
    ))
}

/// reorder_gallery
///
/// [Authenticated Route] Takes the complete new order of photo ids.
#[utoipa::path(
    put,
    path = "/api/admin/gallery/order",
    request_body = ReorderRequest,
    responses((status = 200, description = "Order saved", body = ReorderResponse))
)]
pub async fn reorder_gallery(
    State(gallery): State<GalleryService>,
    JsonBody(payload): JsonBody<ReorderRequest>,
) -> AppResult<Json<ReorderResponse>> {
    let updated = gallery.reorder(&payload.order).await?;
    Ok(Json(ReorderResponse {
        message: "Gallery order updated".into(),
        updated,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/admin/gallery/{id}",
    params(("id" = i64, Path, description = "Photo id")),
    request_body = UpdatePhotoRequest,
    responses(
        (status = 200, description = "Photo updated", body = MessageResponse),
        (status = 404, description = "Photo not found")
    )
)]
pub async fn update_photo(
    State(gallery): State<GalleryService>,
    Path(id): Path<i64>,
    JsonBody(payload): JsonBody<UpdatePhotoRequest>,
) -> AppResult<Json<MessageResponse>> {
    gallery.update_alt(id, payload.alt.as_deref()).await?;
    Ok(Json(MessageResponse::new("Photo updated")))
}

/// delete_photo
///
/// [Authenticated Route] The row goes first; the stored bytes are removed on
/// a best-effort basis.
#[utoipa::path(
    delete,
    path = "/api/admin/gallery/{id}",
    params(("id" = i64, Path, description = "Photo id")),
    responses(
        (status = 200, description = "Photo deleted", body = MessageResponse),
        (status = 404, description = "Photo not found")
    )
)]
pub async fn delete_photo(
    State(gallery): State<GalleryService>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    gallery.delete(id).await?;
    Ok(Json(MessageResponse::new("Photo deleted")))
}

// --- User Administration ---

/// list_users
///
/// [Superadmin Route]
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [User]),
        (status = 403, description = "Not a superadmin")
    )
)]
pub async fn list_users(
    _caller: SuperAdmin,
    State(users): State<UserService>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(users.list().await?))
}

/// delete_user
///
/// [Superadmin Route] A superadmin cannot delete their own account.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Cannot delete own account"),
        (status = 403, description = "Not a superadmin"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    caller: SuperAdmin,
    State(users): State<UserService>,
    Path(id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    users.delete(&caller.0, id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}
