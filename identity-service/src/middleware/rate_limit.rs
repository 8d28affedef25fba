//! Per-route fixed-window throttling in front of the handlers.

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::services::RateLimitStore;
use crate::utils::ClientIpConfig;

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBucket {
    pub name: &'static str,
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitBucket {
    pub const LOGIN: RateLimitBucket = RateLimitBucket {
        name: "login",
        limit: 5,
        window: Duration::from_secs(60),
    };
    pub const CLIENT_READ: RateLimitBucket = RateLimitBucket {
        name: "client_read",
        limit: 100,
        window: Duration::from_secs(60),
    };
    pub const CLIENT_WRITE: RateLimitBucket = RateLimitBucket {
        name: "client_write",
        limit: 10,
        window: Duration::from_secs(60),
    };
    pub const OAUTH2: RateLimitBucket = RateLimitBucket {
        name: "oauth2",
        limit: 30,
        window: Duration::from_secs(60),
    };

    /// Hex sha256 of bucket, method, route and address.
    pub fn key(&self, method: &Method, path: &str, ip: IpAddr) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(method.as_str().as_bytes());
        hasher.update(path.as_bytes());
        hasher.update(ip.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Which buckets a group of routes draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitClass {
    Login,
    /// Reads and writes are counted separately.
    Client,
    OAuth2,
}

impl RateLimitClass {
    pub fn bucket(self, method: &Method) -> RateLimitBucket {
        match self {
            RateLimitClass::Login => RateLimitBucket::LOGIN,
            RateLimitClass::OAuth2 => RateLimitBucket::OAUTH2,
            RateLimitClass::Client if method == Method::GET || method == Method::HEAD => {
                RateLimitBucket::CLIENT_READ
            }
            RateLimitClass::Client => RateLimitBucket::CLIENT_WRITE,
        }
    }
}

/// Middleware state: the shared counter store plus the class of the routes it guards.
#[derive(Clone)]
pub struct RouteLimiter {
    pub store: Arc<dyn RateLimitStore>,
    pub client_ip: Arc<ClientIpConfig>,
    pub class: RateLimitClass,
}

fn header_value(value: u64) -> HeaderValue {
    HeaderValue::from(value)
}

pub async fn rate_limit_middleware(
    State(limiter): State<RouteLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let Some(ip) = limiter.client_ip.resolve(request.headers(), peer) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    let bucket = limiter.class.bucket(request.method());
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = bucket.key(request.method(), &path, ip);

    let count = limiter.store.increment(&key, bucket.window).await.map_err(|e| {
        tracing::error!(bucket = bucket.name, error = %e, "Rate limit increment failed");
        AppError::InternalError(e)
    })?;
    let ttl = limiter.store.ttl(&key).await.map_err(|e| {
        tracing::error!(bucket = bucket.name, error = %e, "Rate limit ttl failed");
        AppError::InternalError(e)
    })?;
    let reset = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);

    let mut response = if count > bucket.limit {
        metrics::counter!("rate_limit_rejections_total", "bucket" => bucket.name).increment(1);
        tracing::info!(bucket = bucket.name, %ip, "Rate limit exceeded");
        AppError::TooManyRequests(
            "Too many requests. Please try again later.".to_string(),
            Some(reset),
        )
        .into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(HEADER_LIMIT, header_value(bucket.limit));
    headers.insert(
        HEADER_REMAINING,
        header_value(bucket.limit.saturating_sub(count)),
    );
    headers.insert(HEADER_RESET, header_value(reset));
    Ok(response)
}
