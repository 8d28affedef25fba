//! Request credential resolution.
//!
//! First-party callers present a session token (cookie or `Authorization: User <token>`),
//! third-party applications present a connection access token (`Authorization: Bearer <token>`).

use axum::http::{header, HeaderMap};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::models::SessionContext;
use crate::services::clock::Clock;
use crate::services::store::IdentityStore;
use crate::services::ServiceError;

const USER_SCHEME: &str = "User ";
const BEARER_SCHEME: &str = "Bearer ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Session(String),
    Bearer(String),
}

impl Credential {
    /// The cookie wins over the header when both are present.
    pub fn from_request(cookie_name: &str, jar: &CookieJar, headers: &HeaderMap) -> Option<Self> {
        if let Some(cookie) = jar.get(cookie_name) {
            return Some(Credential::Session(cookie.value().to_string()));
        }

        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        if let Some(token) = value.strip_prefix(USER_SCHEME) {
            Some(Credential::Session(token.trim().to_string()))
        } else {
            value
                .strip_prefix(BEARER_SCHEME)
                .map(|token| Credential::Bearer(token.trim().to_string()))
        }
    }
}

#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Resolve the caller. Read-only: never touches revocation or elevation state.
    pub async fn resolve(
        &self,
        credential: Option<Credential>,
    ) -> Result<SessionContext, ServiceError> {
        let now = self.clock.now();

        match credential.ok_or(ServiceError::Unauthenticated)? {
            Credential::Session(token) => {
                let session = self
                    .store
                    .find_session_by_token(&token)
                    .await?
                    .ok_or(ServiceError::Unauthenticated)?;
                if session.revoked {
                    return Err(ServiceError::AccessRevoked);
                }
                Ok(SessionContext::for_session(&session, now))
            }
            Credential::Bearer(token) => {
                let connection = self
                    .store
                    .find_connection_by_access_token(&token)
                    .await?
                    .ok_or(ServiceError::Unauthenticated)?;
                if connection.is_expired_at(now) {
                    return Err(ServiceError::AccessExpired);
                }
                if connection.revoked {
                    return Err(ServiceError::AccessRevoked);
                }
                Ok(SessionContext::for_connection(
                    connection.user_id,
                    connection.id,
                    connection.application_id,
                    connection.scopes,
                ))
            }
        }
    }
}
