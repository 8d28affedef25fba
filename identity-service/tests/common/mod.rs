//! Shared router harness: in-memory store, manual clock and mock collaborators.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use identity_service::{
    build_router,
    config::HttpConfig,
    services::{
        BackgroundQueue, ManualClock, MemoryRateLimiter, MemoryStore, MockEmailService,
        MockGeolocation, MockStorage, Notification, SnowflakeGenerator,
    },
    AppState, Collaborators,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub email: Arc<MockEmailService>,
    pub storage: Arc<MockStorage>,
    pub peer: SocketAddr,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let email = Arc::new(MockEmailService::new());
        let storage = Arc::new(MockStorage::new());
        let (background, _worker) = BackgroundQueue::start(64);

        let state = AppState::new(
            HttpConfig::default(),
            Collaborators {
                store: Arc::new(MemoryStore::new()),
                clock: clock.clone(),
                ids: Arc::new(SnowflakeGenerator::new(1).unwrap()),
                rate_limiter: Arc::new(MemoryRateLimiter::new(clock.clone())),
                email: email.clone(),
                storage: storage.clone(),
                geolocation: Arc::new(MockGeolocation::new()),
                background,
                totp_issuer: "Identity".to_string(),
            },
        );

        Self {
            router: build_router(state).unwrap(),
            clock,
            email,
            storage,
            peer: SocketAddr::from(([203, 0, 113, 7], 40000)),
        }
    }

    /// Send through the full router as if from `self.peer`.
    pub async fn send(&self, mut req: Request<Body>) -> Response<Body> {
        req.extensions_mut().insert(ConnectInfo(self.peer));
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn signup(&self, email: &str, username: &str) {
        let res = self
            .call(
                Method::POST,
                "/auth/signup",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    pub async fn login(&self, email: &str, passcode: Option<&str>) -> Response<Body> {
        self.call(
            Method::POST,
            "/auth/login",
            None,
            Some(serde_json::json!({
                "email": email,
                "password": PASSWORD,
                "passcode": passcode,
            })),
        )
        .await
    }

    /// Sign up and log in, returning a `User <token>` authorization value.
    pub async fn user(&self, email: &str, username: &str) -> String {
        self.signup(email, username).await;
        let res = self.login(email, None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        format!("User {}", session_token(&res))
    }

    pub async fn escalate(&self, auth: &str, body: Value) -> Response<Body> {
        self.call(
            Method::POST,
            "/users/@me/security/escalate",
            Some(auth),
            Some(body),
        )
        .await
    }

    /// Wait for the background queue to deliver a `kind` message to `to`.
    pub async fn wait_for_mail(&self, to: &str, kind: &str) -> Notification {
        for _ in 0..100 {
            let delivered = self
                .email
                .sent()
                .into_iter()
                .rev()
                .find(|(t, n)| t == to && n.kind() == kind);
            if let Some((_, n)) = delivered {
                return n;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no {kind} mail delivered to {to}");
    }
}

/// Token from the session cookie set by a login response.
pub fn session_token(res: &Response<Body>) -> String {
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .expect("login sets a cookie")
        .to_str()
        .unwrap();
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("session="))
        .expect("session cookie")
        .to_string()
}

pub async fn json_body(res: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Status plus the numeric error code from the body.
pub async fn rejection(res: Response<Body>) -> (StatusCode, Option<u64>) {
    let status = res.status();
    let body = json_body(res).await;
    (status, body["code"].as_u64())
}
