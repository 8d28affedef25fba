//! Durable user-to-application authorization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::Scopes;

/// Access tokens stay valid for a week after issue or refresh.
pub const ACCESS_TOKEN_LIFETIME_SECONDS: i64 = 7 * 24 * 60 * 60;

/// At most one row per (user_id, application_id); a repeat exchange resets it in place.
#[derive(Debug, Clone, FromRow)]
pub struct Connection {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub user_id: i64,
    pub application_id: i64,
    pub revoked: bool,
    pub scopes: Scopes,
    pub token_access: String,
    pub token_refresh: String,
    pub token_expires: DateTime<Utc>,
}

impl Connection {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.token_expires
    }
}

/// Connection listing entry, joined with its application.
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionSummary {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub scopes: Scopes,
    pub application_id: i64,
    pub application_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionInfo {
    pub id: String,
    pub created: DateTime<Utc>,
    #[schema(value_type = Vec<String>)]
    pub scopes: Scopes,
    pub application: ConnectedApplication,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectedApplication {
    pub id: String,
    pub name: String,
}

impl From<ConnectionSummary> for ConnectionInfo {
    fn from(c: ConnectionSummary) -> Self {
        Self {
            id: c.id.to_string(),
            created: c.created,
            scopes: c.scopes,
            application: ConnectedApplication {
                id: c.application_id.to_string(),
                name: c.application_name,
            },
        }
    }
}
