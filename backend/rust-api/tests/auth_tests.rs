mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serial_test::serial;
use tower::ServiceExt;

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn register_login_and_me_roundtrip() {
    let app = common::create_test_app().await;
    let email = common::unique_email("auth");

    let (register_token, user_id) = common::register_user(&app.router, &email).await;
    assert!(!register_token.is_empty());

    // Login with the same credentials.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": "secret123" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    let login_token = json["accessToken"].as_str().unwrap();

    let response = common::get_with_token(&app.router, login_token, "/api/v1/auth/me").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["id"], user_id);
    assert_eq!(json["email"], email);
    assert_eq!(json["role"], "USER");
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn duplicate_email_is_a_conflict() {
    let app = common::create_test_app().await;
    let email = common::unique_email("duplicate");

    common::register_user(&app.router, &email).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "name": "Second User",
                        "email": email,
                        "password": "secret123"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn wrong_password_is_unauthorized() {
    let app = common::create_test_app().await;
    let email = common::unique_email("badpass");
    common::register_user(&app.router, &email).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "password": "wrong-password" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn protected_routes_require_a_token() {
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running MongoDB (set MONGO_URI / .env.test)"]
async fn admin_routes_reject_regular_users() {
    let app = common::create_test_app().await;
    let (token, _) = common::register_user(&app.router, &common::unique_email("nonadmin")).await;

    let response = common::get_with_token(&app.router, &token, "/api/v1/admin/dashboard").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
