#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use parish_cms::{
    AppConfig, AppState, ImageStorage, MockObjectStore, RemoteBucket, create_router,
    credentials::Role,
    db::{Db, SqliteDatabase, schema},
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// --- TEST UTILITIES ---

/// A fully wired application on an in-memory database.
pub struct TestApp {
    pub state: AppState,
    pub store: MockObjectStore,
    /// Scratch upload directory; removed on drop.
    pub uploads: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Registers an account and returns a session token for it.
    pub async fn token_for(&self, username: &str, password: &str) -> (i64, Role, String) {
        let user = self.state.users.register(username, password).await.unwrap();
        let token = self
            .state
            .tokens
            .issue(user.id, &user.username, user.role)
            .unwrap();
        (user.id, user.role, token)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }
}

pub async fn test_db() -> Db {
    let db: Db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
    schema::init_schema(db.as_ref()).await.unwrap();
    db
}

/// Application storing gallery images on local disk.
pub async fn spawn_local() -> TestApp {
    spawn(false).await
}

/// Application storing gallery images in a mock remote bucket.
pub async fn spawn_remote() -> TestApp {
    spawn(true).await
}

async fn spawn(remote: bool) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let store = MockObjectStore::new();
    let bucket = remote
        .then(|| RemoteBucket::new(Arc::new(store.clone()), "https://media.example.org"));

    let config = AppConfig {
        upload_dir: uploads.path().to_path_buf(),
        ..AppConfig::default()
    };
    let storage = ImageStorage::new(uploads.path(), bucket);
    let state = AppState::new(config, test_db().await, storage);

    TestApp {
        state,
        store,
        uploads,
    }
}

/// A `data:` URL wrapping `len` bytes of fake PNG data.
pub fn png_data_url(len: usize) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(vec![0x89_u8; len]))
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
