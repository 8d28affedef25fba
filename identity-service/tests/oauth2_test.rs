mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt};
use common::{json_body, rejection, TestApp};
use serde_json::{json, Value};
use std::collections::HashMap;

const REDIRECT: &str = "https://app.example.com/callback";

struct Client {
    id: String,
    secret: String,
}

async fn create_application(app: &TestApp, auth: &str) -> Client {
    let res = app
        .call(
            Method::POST,
            "/users/@me/applications",
            Some(auth),
            Some(json!({"name": "Photos", "redirects": [REDIRECT]})),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = json_body(res).await;
    Client {
        id: body["id"].as_str().unwrap().to_string(),
        secret: body["secret"].as_str().unwrap().to_string(),
    }
}

fn authorize_uri(client_id: &str, scope: &str, state: Option<&str>) -> String {
    let mut params = vec![
        ("client_id", client_id),
        ("response_type", "code"),
        ("redirect_uri", REDIRECT),
        ("scope", scope),
    ];
    if let Some(state) = state {
        params.push(("state", state));
    }
    format!(
        "/oauth2/authorize?{}",
        serde_urlencoded::to_string(params).unwrap()
    )
}

/// Approve and return the query parameters of the redirect.
async fn approve(
    app: &TestApp,
    auth: &str,
    client: &Client,
    scope: &str,
) -> HashMap<String, String> {
    let res = app
        .call(
            Method::POST,
            &authorize_uri(&client.id, scope, Some("xyz")),
            Some(auth),
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::FOUND);
    let location = res.headers()[header::LOCATION].to_str().unwrap();
    let (base, query) = location.split_once('?').unwrap();
    assert_eq!(base, REDIRECT);
    serde_urlencoded::from_str(query).unwrap()
}

async fn token_request(
    app: &TestApp,
    path: &str,
    client: Option<&Client>,
    form: &[(&str, &str)],
) -> Response<Body> {
    let mut req = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
        .unwrap();
    if let Some(client) = client {
        req.headers_mut()
            .typed_insert(Authorization::basic(&client.id, &client.secret));
    }
    app.send(req).await
}

async fn exchange(app: &TestApp, client: &Client, code: &str) -> Response<Body> {
    token_request(
        app,
        "/oauth2/token",
        Some(client),
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT),
        ],
    )
    .await
}

async fn connected(app: &TestApp, scope: &str) -> (String, Client, Value) {
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(app, &auth).await;
    let redirect = approve(app, &auth, &client, scope).await;
    let res = exchange(app, &client, &redirect["code"]).await;
    assert_eq!(res.status(), StatusCode::OK);
    (auth, client, json_body(res).await)
}

#[tokio::test]
async fn consent_describes_the_request() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;

    let res = app
        .call(
            Method::GET,
            &authorize_uri(&client.id, "identify email", None),
            Some(&auth),
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["application"]["name"], "Photos");
    assert_eq!(body["scopes"], json!(["identify", "email"]));
    assert_eq!(body["redirect_uri"], REDIRECT);
}

#[tokio::test]
async fn authorize_rejects_bad_requests() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;

    let res = app
        .call(
            Method::POST,
            &authorize_uri(&client.id, "identify admin", None),
            Some(&auth),
            None,
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6090)));

    let uri = format!(
        "/oauth2/authorize?{}",
        serde_urlencoded::to_string([
            ("client_id", client.id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", "https://evil.example.com/"),
            ("scope", "identify"),
        ])
        .unwrap()
    );
    let res = app.call(Method::POST, &uri, Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6030)));

    let res = app
        .call(
            Method::POST,
            &authorize_uri("12345", "identify", None),
            Some(&auth),
            None,
        )
        .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1050)));
}

#[tokio::test]
async fn code_exchange_issues_scoped_tokens() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;

    let redirect = approve(&app, &auth, &client, "identify").await;
    assert_eq!(redirect["state"], "xyz");

    let res = exchange(&app, &client, &redirect["code"]).await;
    assert_eq!(res.status(), StatusCode::OK);
    let tokens = json_body(res).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 604800);
    assert_eq!(tokens["scopes"], "identify");

    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());
    let me = json_body(app.call(Method::GET, "/users/@me", Some(&bearer), None).await).await;
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], Value::Null);

    // Applications never reach user-only routes
    let res = app
        .call(Method::GET, "/users/@me/security/sessions", Some(&bearer), None)
        .await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(6020)));

    // Codes are single use
    let res = exchange(&app, &client, &redirect["code"]).await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6060)));
}

#[tokio::test]
async fn email_scope_reveals_address() {
    let app = TestApp::new();
    let (_, _, tokens) = connected(&app, "identify+email").await;

    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());
    let me = json_body(app.call(Method::GET, "/users/@me", Some(&bearer), None).await).await;
    assert_eq!(me["email"], "alice@example.com");
}

#[tokio::test]
async fn expired_code_is_invalid() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;
    let redirect = approve(&app, &auth, &client, "identify").await;

    app.clock.advance(chrono::Duration::seconds(16));
    let res = exchange(&app, &client, &redirect["code"]).await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6060)));
}

#[tokio::test]
async fn client_authentication_is_required() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;
    let redirect = approve(&app, &auth, &client, "identify").await;
    let form = [
        ("grant_type", "authorization_code"),
        ("code", redirect["code"].as_str()),
        ("redirect_uri", REDIRECT),
    ];

    let res = token_request(&app, "/oauth2/token", None, &form).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(0)));

    let wrong = Client {
        id: client.id.clone(),
        secret: "00".repeat(32),
    };
    let res = token_request(&app, "/oauth2/token", Some(&wrong), &form).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(0)));

    let unknown = Client {
        id: "not-a-number".to_string(),
        secret: client.secret.clone(),
    };
    let res = token_request(&app, "/oauth2/token", Some(&unknown), &form).await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1050)));

    let res = token_request(
        &app,
        "/oauth2/token",
        Some(&client),
        &[("grant_type", "password")],
    )
    .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6050)));
}

#[tokio::test]
async fn unauthenticated_token_requests_get_401_for_any_form() {
    let app = TestApp::new();
    let forms: [&[(&str, &str)]; 4] = [
        &[("grant_type", "authorization_code"), ("code", "short")],
        &[("grant_type", "refresh_token"), ("refresh_token", "short")],
        &[("grant_type", "password")],
        &[],
    ];

    for form in forms {
        let res = token_request(&app, "/oauth2/token", None, form).await;
        assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(0)));
    }
}

#[tokio::test]
async fn refresh_rotates_tokens_and_keeps_scopes() {
    let app = TestApp::new();
    let (_, client, tokens) = connected(&app, "identify+email").await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let res = token_request(
        &app,
        "/oauth2/token",
        Some(&client),
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated = json_body(res).await;
    assert_eq!(rotated["scopes"], "identify email");
    assert_ne!(rotated["access_token"], tokens["access_token"]);

    // The old access token is gone
    let old = format!("Bearer {}", tokens["access_token"].as_str().unwrap());
    let res = app.call(Method::GET, "/users/@me", Some(&old), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // And so is the old refresh token
    let res = token_request(
        &app,
        "/oauth2/token",
        Some(&client),
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
    )
    .await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(0)));

    let res = token_request(
        &app,
        "/oauth2/token",
        Some(&client),
        &[("grant_type", "refresh_token"), ("refresh_token", "short")],
    )
    .await;
    assert_eq!(rejection(res).await, (StatusCode::BAD_REQUEST, Some(6080)));
}

#[tokio::test]
async fn access_tokens_expire_after_a_week() {
    let app = TestApp::new();
    let (_, _, tokens) = connected(&app, "identify").await;
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());

    app.clock.advance(chrono::Duration::days(7) + chrono::Duration::seconds(1));
    let res = app.call(Method::GET, "/users/@me", Some(&bearer), None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3020)));
}

#[tokio::test]
async fn client_revocation_cuts_access() {
    let app = TestApp::new();
    let (_, client, tokens) = connected(&app, "identify").await;
    let access = tokens["access_token"].as_str().unwrap();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let res = token_request(
        &app,
        "/oauth2/token/revoke",
        Some(&client),
        &[("token", access)],
    )
    .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let bearer = format!("Bearer {access}");
    let res = app.call(Method::GET, "/users/@me", Some(&bearer), None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3010)));

    let res = token_request(
        &app,
        "/oauth2/token",
        Some(&client),
        &[("grant_type", "refresh_token"), ("refresh_token", refresh)],
    )
    .await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3010)));

    let res = token_request(
        &app,
        "/oauth2/token/revoke",
        Some(&client),
        &[("token", "bogus")],
    )
    .await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1060)));
}

#[tokio::test]
async fn user_can_list_and_revoke_connections() {
    let app = TestApp::new();
    let (auth, _, tokens) = connected(&app, "identify").await;

    let res = app
        .call(Method::GET, "/users/@me/connections", Some(&auth), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let listed = json_body(res).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    let id = listed[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/users/@me/connections/{id}");
    let res = app.call(Method::DELETE, &uri, Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5070)));

    let res = app
        .escalate(&auth, json!({"password": common::PASSWORD}))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = app.call(Method::DELETE, &uri, Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());
    let res = app.call(Method::GET, "/users/@me", Some(&bearer), None).await;
    assert_eq!(rejection(res).await, (StatusCode::UNAUTHORIZED, Some(3010)));
}

#[tokio::test]
async fn application_management() {
    let app = TestApp::new();
    let auth = app.user("alice@example.com", "alice").await;
    let client = create_application(&app, &auth).await;

    let listed = json_body(
        app.call(Method::GET, "/users/@me/applications", Some(&auth), None)
            .await,
    )
    .await;
    assert_eq!(listed[0]["id"], client.id.as_str());
    assert!(listed[0].get("secret").is_none());

    let reset = format!("/users/@me/applications/{}/reset", client.id);
    let res = app.call(Method::POST, &reset, Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::FORBIDDEN, Some(5070)));

    let res = app
        .escalate(&auth, json!({"password": common::PASSWORD}))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = app.call(Method::POST, &reset, Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let secret = json_body(res).await["secret"].as_str().unwrap().to_string();
    assert_ne!(secret, client.secret);

    let path = format!("/users/@me/applications/{}", client.id);
    let res = app.call(Method::DELETE, &path, Some(&auth), None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = app.call(Method::DELETE, &path, Some(&auth), None).await;
    assert_eq!(rejection(res).await, (StatusCode::NOT_FOUND, Some(1050)));
}
