mod common;

use axum::http::{header, Method, StatusCode};
use common::{json_body, rejection, session_token, TestApp, PASSWORD};
use identity_service::services::Notification;
use serde_json::json;

#[tokio::test]
async fn health_reports_service() {
    let app = TestApp::new();

    let res = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body = json_body(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "identity-service");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new();

    let res = app
        .call(Method::GET, "/.well-known/openapi.json", None, None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = json_body(res).await;
    assert!(body["paths"]["/oauth2/token"].is_object());
    assert!(body["components"]["securitySchemes"]["session_cookie"].is_object());
}

#[tokio::test]
async fn signup_login_and_read_profile() {
    let app = TestApp::new();
    app.signup("alice@example.com", "alice").await;

    let res = app.login("alice@example.com", None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=2592000"));
    let token = session_token(&res);

    // The cookie and the `User` scheme resolve to the same session
    let req = axum::http::Request::builder()
        .uri("/users/@me")
        .header(header::COOKIE, format!("session={token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me = json_body(res).await;
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["verified"], false);
    assert_eq!(me["mfa_enabled"], false);

    let res = app
        .call(Method::GET, "/users/@me", Some(&format!("User {token}")), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_unknown_credentials_are_unauthenticated() {
    let app = TestApp::new();

    let res = app.call(Method::GET, "/users/@me", None, None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(0)));

    let bogus = format!("User {}", "ab".repeat(32));
    let res = app.call(Method::GET, "/users/@me", Some(&bogus), None).await;
    assert_eq!(rejection(res).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = TestApp::new();
    app.signup("alice@example.com", "alice").await;

    let res = app
        .call(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "alice@example.com", "username": "other", "password": PASSWORD})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::CONFLICT, Some(4060)));

    let res = app
        .call(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "bob@example.com", "username": "alice", "password": PASSWORD})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::CONFLICT, Some(4050)));
}

#[tokio::test]
async fn signup_validates_body() {
    let app = TestApp::new();

    let res = app
        .call(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "not-an-email", "username": "alice", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .call(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "a@example.com", "username": "al-ice", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn email_verification_token_is_single_use() {
    let app = TestApp::new();
    app.signup("alice@example.com", "alice").await;

    let Notification::VerifyEmail { token, .. } =
        app.wait_for_mail("alice@example.com", "verify_email").await
    else {
        panic!("expected a verification email");
    };

    let res = app
        .call(Method::POST, "/auth/verify-email", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .call(Method::POST, "/auth/verify-email", None, Some(json!({"token": token})))
        .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1030)));
}

#[tokio::test]
async fn wrong_password_is_login_incorrect() {
    let app = TestApp::new();
    app.signup("alice@example.com", "alice").await;

    let res = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "alice@example.com", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(4010)));

    let res = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "nobody@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(4010)));
}

#[tokio::test]
async fn logout_revokes_session_and_clears_cookie() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;

    let res = app.call(Method::POST, "/auth/logout", Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session=DELETED"));
    assert!(cookie.contains("Max-Age=0"));

    let res = app.call(Method::GET, "/users/@me", Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3010)));
}

#[tokio::test]
async fn password_reset_round_trip() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;

    // Unknown addresses get the same answer
    let res = app
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({"email": "nobody@example.com"})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({"email": "alice@example.com"})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let Notification::PasswordReset { token, .. } =
        app.wait_for_mail("alice@example.com", "password_reset").await
    else {
        panic!("expected a reset email");
    };

    let res = app
        .call(
            Method::PATCH,
            "/auth/reset-password",
            None,
            Some(json!({"token": token, "password": "brand-new-password"})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Every session was revoked
    let res = app.call(Method::GET, "/users/@me", Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "alice@example.com", "password": "brand-new-password"})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn change_password_rejects_reuse() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/password",
            Some(&auth),
            Some(json!({"old_password": PASSWORD, "new_password": PASSWORD})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(4040)));

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/password",
            Some(&auth),
            Some(json!({"old_password": "wrong-password", "new_password": "another-password"})),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(5080)));

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/password",
            Some(&auth),
            Some(json!({"old_password": PASSWORD, "new_password": "another-password"})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // The calling session survives
    let res = app.call(Method::GET, "/users/@me", Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn elevation_gates_and_expires() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;

    let res = app.call(Method::DELETE, "/users/@me", Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5070)));

    let res = app.escalate(&auth, json!({"password": "wrong-password"})).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(5080)));

    let res = app.escalate(&auth, json!({"password": PASSWORD})).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    app.clock.advance(chrono::Duration::minutes(11));
    let res = app.call(Method::DELETE, "/users/@me", Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5070)));
}

#[tokio::test]
async fn delete_account_cascades_and_cleans_up() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let me = json_body(app.call(Method::GET, "/users/@me", Some(&auth), None).await).await;
    let id = me["id"].as_str().unwrap().to_string();

    let res = app.escalate(&auth, json!({"password": PASSWORD})).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.call(Method::DELETE, "/users/@me", Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .starts_with("session=DELETED"));

    let notification = app
        .wait_for_mail("alice@example.com", "account_deleted")
        .await;
    assert!(matches!(notification, Notification::AccountDeleted { .. }));
    // Asset cleanup is queued ahead of the email on the same worker
    assert!(app.storage.deleted().contains(&format!("avatars/{id}")));

    let res = app.call(Method::GET, "/users/@me", Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = app.login("alice@example.com", None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(4010)));
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked() {
    let app = TestApp::new();
    let first = app.user("alice@example.com", "alice").await;
    let second = format!(
        "User {}",
        session_token(&app.login("alice@example.com", None).await)
    );

    let res = app
        .call(Method::GET, "/users/@me/security/sessions", Some(&first), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    let current = body["current"].as_str().unwrap().to_string();
    let other = sessions
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .find(|id| *id != current)
        .unwrap();

    let res = app.escalate(&first, json!({"password": PASSWORD})).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let uri = format!("/users/@me/security/sessions/{other}");
    let res = app.call(Method::DELETE, &uri, Some(&first), None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.call(Method::GET, "/users/@me", Some(&second), None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3010)));

    // Already revoked
    let res = app.call(Method::DELETE, &uri, Some(&first), None).await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1040)));
}

#[tokio::test]
async fn login_from_new_location_needs_confirmation() {
    let mut app = TestApp::new();
    app.signup("alice@example.com", "alice").await;
    let Notification::VerifyEmail { token, .. } =
        app.wait_for_mail("alice@example.com", "verify_email").await
    else {
        panic!("expected a verification email");
    };
    let res = app
        .call(Method::POST, "/auth/verify-email", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    app.peer = "198.51.100.20:50000".parse().unwrap();
    let res = app.login("alice@example.com", None).await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5010)));

    let Notification::VerifyLogin { token, .. } =
        app.wait_for_mail("alice@example.com", "verify_login").await
    else {
        panic!("expected a login confirmation email");
    };
    let res = app
        .call(Method::POST, "/auth/verify-login", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app.login("alice@example.com", None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}
