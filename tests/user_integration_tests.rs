mod common;

use axum::http::StatusCode;
use common::{body_json, delete, json_request, spawn_local, test_db};
use parish_cms::{AppError, UserService, auth::AuthUser, credentials::Role, db::schema};
use serde_json::json;

fn caller(id: i64, role: Role) -> AuthUser {
    AuthUser {
        id,
        username: format!("user-{id}"),
        role,
    }
}

#[tokio::test]
async fn test_first_account_is_the_only_superadmin() {
    let users = UserService::new(test_db().await);

    let first = users.register("pastor", "amazing-grace").await.unwrap();
    let second = users.register("editor", "editor-pass").await.unwrap();
    assert_eq!(first.role, Role::SuperAdmin);
    assert_eq!(second.role, Role::Admin);

    let listed = users.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(
        listed.iter().filter(|u| u.role == Role::SuperAdmin).count(),
        1
    );
}

#[tokio::test]
async fn test_registration_rules() {
    let users = UserService::new(test_db().await);
    users.register("pastor", "amazing-grace").await.unwrap();

    assert!(matches!(
        users.register("pastor", "another-pass").await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        users.register("deacon", "short").await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        users.register("  ", "long-enough").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_authenticate_checks_password() {
    let users = UserService::new(test_db().await);
    users.register("pastor", "amazing-grace").await.unwrap();

    let user = users.authenticate("pastor", "amazing-grace").await.unwrap();
    assert_eq!(user.username, "pastor");

    let wrong = users.authenticate("pastor", "amazing-grac").await.unwrap_err();
    let unknown = users.authenticate("nobody", "amazing-grace").await.unwrap_err();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_deletion_rules() {
    let users = UserService::new(test_db().await);
    let boss = users.register("pastor", "amazing-grace").await.unwrap();
    let editor = users.register("editor", "editor-pass").await.unwrap();
    let other = users.register("deacon", "deacon-pass").await.unwrap();

    let admin = caller(editor.id, Role::Admin);
    assert!(matches!(
        users.delete(&admin, other.id).await,
        Err(AppError::Forbidden)
    ));

    let superadmin = caller(boss.id, Role::SuperAdmin);
    let own = users.delete(&superadmin, boss.id).await.unwrap_err();
    assert_eq!(own.status(), StatusCode::BAD_REQUEST);

    users.delete(&superadmin, other.id).await.unwrap();
    assert!(matches!(
        users.delete(&superadmin, other.id).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(users.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_seed_only_runs_on_an_empty_table() {
    let users = UserService::new(test_db().await);

    let seeded = users.seed("pastor", "amazing-grace").await.unwrap();
    assert_eq!(seeded.role, Role::SuperAdmin);

    assert!(matches!(
        users.seed("intruder", "amazing-grace").await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_startup_repairs_missing_superadmin() {
    let db = test_db().await;
    let users = UserService::new(db.clone());
    let boss = users.register("pastor", "amazing-grace").await.unwrap();
    let editor = users.register("editor", "editor-pass").await.unwrap();

    // Bootstrap account removed behind the application's back.
    db.run("DELETE FROM users WHERE id = ?", &parish_cms::params![boss.id])
        .await
        .unwrap();
    schema::init_schema(db.as_ref()).await.unwrap();

    assert_eq!(users.get(editor.id).await.unwrap().role, Role::SuperAdmin);
}

#[tokio::test]
async fn test_user_endpoints() {
    let app = spawn_local().await;
    let (boss_id, _, boss) = app.token_for("pastor", "amazing-grace").await;
    let (_, _, editor) = app.token_for("editor", "editor-pass").await;

    // Any admin can register further accounts.
    let created = app
        .send(json_request(
            "POST",
            "/api/auth/register",
            Some(&editor),
            json!({ "username": "deacon", "password": "deacon-pass" }),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let deacon_id = body_json(created).await["id"].as_i64().unwrap();

    let duplicate = app
        .send(json_request(
            "POST",
            "/api/auth/register",
            Some(&editor),
            json!({ "username": "deacon", "password": "deacon-pass" }),
        ))
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let anonymous = app
        .send(json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({ "username": "walk-in", "password": "walk-in-pass" }),
        ))
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forbidden = app
        .send(delete(&format!("/api/admin/users/{deacon_id}"), Some(&editor)))
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let own = app
        .send(delete(&format!("/api/admin/users/{boss_id}"), Some(&boss)))
        .await;
    assert_eq!(own.status(), StatusCode::BAD_REQUEST);

    let removed = app
        .send(delete(&format!("/api/admin/users/{deacon_id}"), Some(&boss)))
        .await;
    assert_eq!(removed.status(), StatusCode::OK);
}
