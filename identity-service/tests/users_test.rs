mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, rejection, TestApp, PASSWORD};
use identity_service::services::Notification;
use serde_json::json;
use std::time::Duration;

async fn my_id(app: &TestApp, auth: &str) -> String {
    let res = app.call(Method::GET, "/users/@me", Some(auth), None).await;
    json_body(res).await["id"].as_str().unwrap().to_string()
}

/// Poll until a verification email other than `stale` reaches `to`.
async fn fresh_verify_token(app: &TestApp, to: &str, stale: &str) -> String {
    for _ in 0..100 {
        let Notification::VerifyEmail { token, .. } = app.wait_for_mail(to, "verify_email").await
        else {
            panic!("expected a verification email");
        };
        if token != stale {
            return token;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no new verification email for {to}");
}

#[tokio::test]
async fn public_profile_needs_no_session() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let id = my_id(&app, &auth).await;

    let res = app
        .call(Method::GET, &format!("/users/{id}"), None, None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let profile = json_body(res).await;
    assert_eq!(profile["id"], id);
    assert_eq!(profile["username"], "alice");
    assert_eq!(profile["displayname"], "alice");
    assert!(profile.get("email").is_none());

    let res = app.call(Method::GET, "/users/not-a-number", None, None).await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1020)));
    let res = app.call(Method::GET, "/users/12345", None, None).await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1020)));
}

#[tokio::test]
async fn profile_edits_are_public() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let id = my_id(&app, &auth).await;

    let res = app
        .call(Method::PATCH, "/users/@me", Some(&auth), Some(json!({})))
        .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(0)));

    let res = app
        .call(
            Method::PATCH,
            "/users/@me",
            Some(&auth),
            Some(json!({"displayname": "a".repeat(33)})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .call(
            Method::PATCH,
            "/users/@me",
            Some(&auth),
            Some(json!({"accent_banner": 16_777_216})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .call(
            Method::PATCH,
            "/users/@me",
            Some(&auth),
            Some(json!({
                "displayname": "Alice",
                "biography": "Takes photos",
                "accent_border": 255,
            })),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let edited = json_body(res).await;
    assert_eq!(edited["displayname"], "Alice");
    assert_eq!(edited["biography"], "Takes photos");
    assert_eq!(edited["accent_border"], 255);

    let res = app
        .call(
            Method::PATCH,
            "/users/@me",
            Some(&auth),
            Some(json!({"displayname": "", "accent_border": 0})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .call(Method::GET, &format!("/users/{id}"), None, None)
        .await;
    let profile = json_body(res).await;
    assert_eq!(profile["displayname"], "alice");
    assert_eq!(profile["biography"], "Takes photos");
    assert!(profile["accent_border"].is_null());
}

#[tokio::test]
async fn email_change_requires_elevation_and_reverification() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    app.signup("bob@example.com", "bob").await;
    let change = |email: &str| json!({ "email": email });

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/email",
            Some(&auth),
            Some(change("carol@example.com")),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5070)));

    let res = app.escalate(&auth, json!({"password": PASSWORD})).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/email",
            Some(&auth),
            Some(change("Bob@Example.com")),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::CONFLICT, Some(4060)));

    let res = app
        .call(
            Method::PATCH,
            "/users/@me/security/email",
            Some(&auth),
            Some(change("carol@example.com")),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let notice = app
        .wait_for_mail("alice@example.com", "email_modified")
        .await;
    assert!(matches!(notice, Notification::EmailModified { .. }));
    let first = fresh_verify_token(&app, "carol@example.com", "").await;

    let me = json_body(app.call(Method::GET, "/users/@me", Some(&auth), None).await).await;
    assert_eq!(me["email"], "carol@example.com");
    assert_eq!(me["verified"], false);

    // Resending replaces the token
    let res = app
        .call(Method::POST, "/users/@me/security/email", Some(&auth), None)
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let second = fresh_verify_token(&app, "carol@example.com", &first).await;

    let res = app
        .call(Method::POST, "/auth/verify-email", None, Some(json!({"token": first})))
        .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1030)));
    let res = app
        .call(Method::POST, "/auth/verify-email", None, Some(json!({"token": second})))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .call(Method::POST, "/users/@me/security/email", Some(&auth), None)
        .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(5020)));
}

#[tokio::test]
async fn owner_edits_application() {
    let app = TestApp::new();
    let owner = app.user("alice@example.com", "alice").await;
    let other = app.user("bob@example.com", "bob").await;

    let res = app
        .call(
            Method::POST,
            "/users/@me/applications",
            Some(&owner),
            Some(json!({"name": "Photos", "redirects": ["https://photos.example.com/cb"]})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = json_body(res).await["id"].as_str().unwrap().to_string();
    let uri = format!("/users/@me/applications/{id}");

    let res = app
        .call(Method::PATCH, &uri, Some(&owner), Some(json!({})))
        .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(0)));

    let res = app
        .call(
            Method::PATCH,
            &uri,
            Some(&owner),
            Some(json!({"redirects": ["ftp://photos.example.com"]})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let rename = json!({"name": "Albums", "description": "Shared albums"});
    let res = app
        .call(Method::PATCH, &uri, Some(&other), Some(rename.clone()))
        .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1050)));
    let res = app
        .call(
            Method::PATCH,
            "/users/@me/applications/photos",
            Some(&owner),
            Some(rename.clone()),
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1050)));

    let res = app
        .call(Method::PATCH, &uri, Some(&owner), Some(rename))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let updated = json_body(res).await;
    assert_eq!(updated["name"], "Albums");
    assert_eq!(updated["description"], "Shared albums");
    assert_eq!(updated["redirects"], json!(["https://photos.example.com/cb"]));
    assert!(updated.get("secret").is_none());

    let res = app
        .call(Method::GET, "/users/@me/applications", Some(&owner), None)
        .await;
    assert_eq!(json_body(res).await[0]["name"], "Albums");
}
