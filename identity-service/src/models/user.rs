//! User account and public profile.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Most recent password hashes kept for reuse checks, current one included.
pub const PASSWORD_HISTORY_LIMIT: usize = 3;

/// Verify-email and password-reset tokens.
pub const EMAIL_TOKEN_LIFETIME_SECONDS: i64 = 24 * 60 * 60;

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub email_address: String,
    pub email_verified: bool,
    /// `None` forces the password reset flow.
    pub password_hash: Option<String>,
    pub password_history: Vec<String>,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub mfa_codes: Vec<String>,
    /// Bit `i` set means `mfa_codes[i]` has been consumed.
    pub mfa_codes_used: i32,
    pub permissions: i32,
    pub ip_address: Option<String>,
    pub token_verify: Option<String>,
    pub token_verify_eat: Option<DateTime<Utc>>,
    /// Pending new-location login; `token_login_data` is the address awaiting approval.
    pub token_login: Option<String>,
    pub token_login_data: Option<String>,
    pub token_login_eat: Option<DateTime<Utc>>,
    pub token_reset: Option<String>,
    pub token_reset_eat: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        id: i64,
        email_address: &str,
        password_hash: String,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            created: now,
            updated: now,
            email_address: email_address.trim().to_lowercase(),
            email_verified: false,
            password_history: vec![password_hash.clone()],
            password_hash: Some(password_hash),
            mfa_enabled: false,
            mfa_secret: None,
            mfa_codes: Vec::new(),
            mfa_codes_used: 0,
            permissions: 0,
            ip_address,
            token_verify: None,
            token_verify_eat: None,
            token_login: None,
            token_login_data: None,
            token_login_eat: None,
            token_reset: None,
            token_reset_eat: None,
        }
    }

    pub fn recovery_code_used(&self, index: usize) -> bool {
        index < 31 && self.mfa_codes_used & (1 << index) != 0
    }
}

/// Append `new_hash` to the history, evicting the oldest entries past the limit.
pub fn push_password_history(history: &[String], new_hash: String) -> Vec<String> {
    let mut next: Vec<String> = history.to_vec();
    next.push(new_hash);
    if next.len() > PASSWORD_HISTORY_LIMIT {
        next.drain(..next.len() - PASSWORD_HISTORY_LIMIT);
    }
    next
}

/// Public profile, 1:1 with [`User`].
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub username: String,
    pub displayname: String,
    pub subtitle: Option<String>,
    pub biography: Option<String>,
    pub accent_banner: Option<i32>,
    pub accent_border: Option<i32>,
    pub accent_background: Option<i32>,
}

impl Profile {
    /// Fresh profile for a new account; the display name starts out as the username.
    pub fn new(id: i64, username: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created: now,
            displayname: username.clone(),
            username,
            subtitle: None,
            biography: None,
            accent_banner: None,
            accent_border: None,
            accent_background: None,
        }
    }
}
