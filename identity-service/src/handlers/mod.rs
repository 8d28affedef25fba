pub mod applications;
pub mod auth;
pub mod connections;
pub mod health;
pub mod oauth2;
pub mod security;
pub mod users;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, SameSite};
use std::net::SocketAddr;

use crate::config::HttpConfig;
use crate::models::SESSION_LIFETIME_SECONDS;
use crate::services::{Device, ServiceError};

/// Cookie value written on logout and account deletion.
pub const DELETED_COOKIE_VALUE: &str = "DELETED";

pub(crate) fn device(
    http: &HttpConfig,
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Device {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    Device {
        ip_address: http.client_ip.resolve(headers, peer),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    }
}

fn session_cookie(http: &HttpConfig, value: String, max_age: time::Duration) -> Cookie<'static> {
    let mut cookie = Cookie::build((http.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(http.cookie_secure)
        .max_age(max_age);
    if let Some(domain) = &http.cookie_domain {
        cookie = cookie.domain(domain.clone());
    }
    cookie.build()
}

pub(crate) fn login_cookie(http: &HttpConfig, token: String) -> Cookie<'static> {
    session_cookie(http, token, time::Duration::seconds(SESSION_LIFETIME_SECONDS))
}

pub(crate) fn cleared_cookie(http: &HttpConfig) -> Cookie<'static> {
    session_cookie(http, DELETED_COOKIE_VALUE.to_string(), time::Duration::ZERO)
}

/// Snowflake ids travel as decimal strings; anything else cannot name a row.
pub(crate) fn parse_id(raw: &str, unknown: ServiceError) -> Result<i64, ServiceError> {
    raw.parse::<i64>().map_err(|_| unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_cookie_attributes() {
        let http = HttpConfig {
            cookie_domain: Some("example.com".to_string()),
            cookie_secure: true,
            ..HttpConfig::default()
        };
        let cookie = login_cookie(&http, "abc".to_string());
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::seconds(SESSION_LIFETIME_SECONDS))
        );
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = cleared_cookie(&HttpConfig::default());
        assert_eq!(cookie.value(), DELETED_COOKIE_VALUE);
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn ids_must_be_decimal() {
        assert_eq!(parse_id("42", ServiceError::UnknownSession).ok(), Some(42));
        assert!(matches!(
            parse_id("4x2", ServiceError::UnknownSession),
            Err(ServiceError::UnknownSession)
        ));
    }
}
