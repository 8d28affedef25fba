//! Third-party OAuth2 clients owned by a user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, FromRow)]
pub struct Application {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Compared in constant time, never logged.
    pub auth_secret: String,
    pub auth_redirects: Vec<String>,
}

impl Application {
    /// Exact string match against the allowlist; no URL canonicalization.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.auth_redirects.iter().any(|uri| uri == redirect_uri)
    }
}

/// Application as shown to its owner. The secret is only returned on create and reset.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationInfo {
    pub id: String,
    pub created: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub redirects: Vec<String>,
}

impl From<Application> for ApplicationInfo {
    fn from(app: Application) -> Self {
        Self {
            id: app.id.to_string(),
            created: app.created,
            name: app.name,
            description: app.description,
            redirects: app.auth_redirects,
        }
    }
}
