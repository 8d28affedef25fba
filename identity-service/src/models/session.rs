//! First-party login sessions and the per-request caller identity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::Scopes;
use crate::services::ServiceError;

/// Application id carried by first-party (cookie / `User` token) callers.
pub const NO_APPLICATION: i64 = 0;

pub const ELEVATION_LIFETIME_SECONDS: i64 = 10 * 60;
pub const SESSION_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Session entity. `revoked` only ever moves from false to true.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub user_id: i64,
    pub token: String,
    pub revoked: bool,
    pub elevated_until: Option<DateTime<Utc>>,
    pub device_ip_address: String,
    pub device_user_agent: String,
}

impl Session {
    pub fn is_elevated_at(&self, now: DateTime<Utc>) -> bool {
        self.elevated_until.is_some_and(|until| until > now)
    }
}

/// Resolved identity for the current request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub connection_id: Option<i64>,
    pub application_id: i64,
    pub scopes: Scopes,
    pub elevated: bool,
}

impl SessionContext {
    pub fn for_session(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            user_id: session.user_id,
            session_id: Some(session.id),
            connection_id: None,
            application_id: NO_APPLICATION,
            scopes: Scopes::NONE,
            elevated: session.is_elevated_at(now),
        }
    }

    pub fn for_connection(
        user_id: i64,
        connection_id: i64,
        application_id: i64,
        scopes: Scopes,
    ) -> Self {
        Self {
            user_id,
            session_id: None,
            connection_id: Some(connection_id),
            application_id,
            scopes,
            elevated: false,
        }
    }

    pub fn is_user(&self) -> bool {
        self.application_id == NO_APPLICATION
    }

    /// First-party callers always pass; applications need every required bit.
    pub fn has_scopes(&self, required: Scopes) -> bool {
        self.is_user() || self.scopes.contains(required)
    }

    pub fn require_scopes(&self, required: Scopes) -> Result<(), ServiceError> {
        if self.has_scopes(required) {
            Ok(())
        } else {
            Err(ServiceError::ScopeRequired)
        }
    }

    /// Reject application callers; returns the session id on success.
    pub fn require_user(&self) -> Result<i64, ServiceError> {
        match self.session_id {
            Some(session_id) if self.is_user() => Ok(session_id),
            _ => Err(ServiceError::UsersOnly),
        }
    }

    pub fn require_elevated(&self) -> Result<i64, ServiceError> {
        let session_id = self.require_user()?;
        if !self.elevated {
            return Err(ServiceError::EscalationRequired);
        }
        Ok(session_id)
    }
}

/// Session listing entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub id: String,
    pub created: DateTime<Utc>,
    pub location: String,
    pub user_agent: String,
}
