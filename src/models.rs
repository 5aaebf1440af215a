use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::credentials::Role;
use crate::db::{DbError, Record};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// An account row from `users`, without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

impl TryFrom<Record> for User {
    type Error = DbError;

    fn try_from(row: Record) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            role: Role::parse(&row.get::<String>("role")?),
            created_at: row.get("created_at")?,
        })
    }
}

/// Post
///
/// A blog post from `posts`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub slug: String,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
    #[ts(type = "string")]
    pub updated_at: NaiveDateTime,
}

impl TryFrom<Record> for Post {
    type Error = DbError;

    fn try_from(row: Record) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            author: row.get("author")?,
            slug: row.get("slug")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// PostSummary
///
/// Dashboard listing entry: everything but the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub slug: String,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
    #[ts(type = "string")]
    pub updated_at: NaiveDateTime,
}

impl TryFrom<Record> for PostSummary {
    type Error = DbError;

    fn try_from(row: Record) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            author: row.get("author")?,
            slug: row.get("slug")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// GalleryPhoto
///
/// A row from `gallery_photos`. `storage_key` is `None` for images on local
/// disk; `url` may be filled in on read (see `ImageStorage::attach_public_url`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct GalleryPhoto {
    pub id: i64,
    pub filename: String,
    pub alt: Option<String>,
    pub position: i64,
    pub storage_key: Option<String>,
    pub url: Option<String>,
    #[ts(type = "string")]
    pub created_at: NaiveDateTime,
}

impl TryFrom<Record> for GalleryPhoto {
    type Error = DbError;

    fn try_from(row: Record) -> Result<Self, Self::Error> {
        let id: i64 = row.get("id")?;
        Ok(Self {
            id,
            filename: row.get("filename")?,
            alt: row.get("alt")?,
            // The start-up backfill makes this non-null; fall back to the id regardless.
            position: row.get::<Option<i64>>("position")?.unwrap_or(id),
            storage_key: row.get("storage_key")?,
            url: row.get("url")?,
            created_at: row.get("created_at")?,
        })
    }
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// RegisterUserRequest
///
/// Creates another admin account. The password is hashed immediately and
/// never stored or logged in clear.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// PostRequest
///
/// Body of both create and update: all three fields are required.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
}

/// CreatePhotoRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePhotoRequest {
    /// `data:image/(png|jpeg|jpg|webp);base64,...`
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// UpdatePhotoRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePhotoRequest {
    #[serde(default)]
    pub alt: Option<String>,
}

/// ReorderRequest
///
/// The complete desired order of photo ids. Entries that are not ids are
/// skipped, so the list is kept as raw JSON values.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ReorderRequest {
    #[schema(value_type = Vec<Object>)]
    #[serde(default)]
    pub order: Vec<serde_json::Value>,
}

// --- Response Schemas (Output) ---

/// LoginResponse
///
/// The token is also set as the `token` cookie; it is returned in the body
/// for clients that authenticate with a bearer header instead.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
    pub role: Role,
    pub token: String,
}

/// SessionInfo
///
/// Identity of the current caller (GET /auth/me).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionInfo {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

/// Created
///
/// Acknowledgement for a newly inserted row.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Created {
    pub message: String,
    pub id: i64,
}

/// PostSaved
///
/// Result of creating or updating a post.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct PostSaved {
    pub message: String,
    pub id: i64,
    pub slug: String,
}

/// MessageResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// PostPreview
///
/// Public list entry: the full post plus a plain-text preview.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct PostPreview {
    #[serde(flatten)]
    pub post: Post,
    pub preview: String,
}

/// PostPage
///
/// One page of the public post listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PostPage {
    pub posts: Vec<PostPreview>,
    pub page: i64,
    pub total_pages: i64,
    pub total_posts: i64,
}

/// ArchiveEntry
///
/// Number of posts created in one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct ArchiveEntry {
    pub year: i32,
    pub month: u32,
    pub count: i64,
}

/// ReorderResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct ReorderResponse {
    pub message: String,
    pub updated: i64,
}
