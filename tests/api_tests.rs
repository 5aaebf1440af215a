mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{body_json, get, json_request, spawn_local};
use parish_cms::MAX_BODY_BYTES;
use serde_json::json;

#[tokio::test]
async fn test_health_check() {
    let app = spawn_local().await;
    let response = app.send(get("/api/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = spawn_local().await;
    let response = app.send(get("/api/health", None)).await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let app = spawn_local().await;
    let response = app.send(get("/api-docs/openapi.json", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_json(response).await;
    let paths = doc["paths"].as_object().unwrap();
    for path in [
        "/api/auth/login",
        "/api/posts",
        "/api/posts/{slug}",
        "/api/admin/gallery/order",
        "/api/admin/users/{id}",
    ] {
        assert!(paths.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn test_cors_allows_configured_origin_with_credentials() {
    let app = spawn_local().await;
    let response = app
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/posts")
                .header(header::ORIGIN, "http://localhost:8080")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:8080"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_unknown_slug_is_json_404() {
    let app = spawn_local().await;
    let response = app.send(get("/api/posts/no-such-post", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "error": "Post not found" }));
}

#[tokio::test]
async fn test_bodies_over_the_router_limit_are_refused() {
    let app = spawn_local().await;
    let (_, _, token) = app.token_for("pastor", "amazing-grace").await;

    let huge = "a".repeat(MAX_BODY_BYTES + 1);
    let response = app
        .send(json_request(
            "POST",
            "/api/admin/posts",
            Some(&token),
            json!({ "title": "Big", "content": huge, "author": "x" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_malformed_bodies_get_json_400() {
    let app = spawn_local().await;
    let (_, _, token) = app.token_for("pastor", "amazing-grace").await;

    let wrong_type = app
        .send(json_request(
            "POST",
            "/api/admin/posts",
            Some(&token),
            json!({ "title": 5, "content": "x", "author": "y" }),
        ))
        .await;
    assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(wrong_type).await,
        json!({ "error": "Invalid request body" })
    );

    let not_json = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{username"))
                .unwrap(),
        )
        .await;
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(not_json).await["error"].is_string());

    let no_content_type = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .body(Body::from(r#"{"username":"a","password":"b"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(no_content_type.status(), StatusCode::BAD_REQUEST);
}
