//! Single-use authorization codes.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::Scopes;

/// Authorization codes are exchanged within this window or not at all.
pub const GRANT_LIFETIME_SECONDS: i64 = 15;

#[derive(Debug, Clone, FromRow)]
pub struct Grant {
    pub id: i64,
    pub code: String,
    pub expires: DateTime<Utc>,
    pub user_id: i64,
    pub application_id: i64,
    pub redirect_uri: String,
    pub scopes: Scopes,
}
