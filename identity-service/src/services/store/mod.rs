//! Persistence boundary for every identity entity.
//!
//! Each mutation that can race reports whether it matched a row, so callers can tell
//! "no such row" apart from success without a separate read.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Application, Connection, ConnectionSummary, Grant, Profile, Session, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    /// Unique constraint violation on the named field.
    #[error("duplicate value for {0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ==================== Users ====================

    /// Insert the user and profile atomically.
    async fn create_user(&self, user: &User, profile: &Profile) -> StoreResult<()>;
    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>>;
    /// Overwrite the editable profile fields; username and created are left alone.
    async fn update_profile(&self, profile: &Profile) -> StoreResult<bool>;
    /// Swap in a new, unverified address with a fresh verify token. Returns the previous
    /// address, `None` for an unknown user, and `Conflict("email")` when the address is taken.
    async fn change_email(
        &self,
        user_id: i64,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>>;
    /// Replace the verify token while the address is still unverified. Returns that address.
    async fn refresh_verify_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>>;
    /// Mark the email verified and clear the token, if it is still live.
    async fn consume_verify_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool>;
    /// Park a login from an unrecognised address until the emailed token is confirmed.
    async fn set_login_token(
        &self,
        user_id: i64,
        token: &str,
        ip_address: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// Adopt the pending address as the known one and clear the token, if it is still live.
    async fn consume_login_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool>;
    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool>;
    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;
    /// Replace hash and history. With `reset_token`, only applies while that token is still set
    /// and clears it in the same statement.
    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        history: &[String],
        reset_token: Option<&str>,
    ) -> StoreResult<bool>;
    async fn delete_user(&self, user_id: i64) -> StoreResult<bool>;

    // ==================== MFA ====================

    /// Store a pending secret and codes; only while MFA is disabled.
    async fn begin_mfa_setup(
        &self,
        user_id: i64,
        secret: &str,
        codes: &[String],
    ) -> StoreResult<bool>;
    /// Flip to enabled; only while disabled with a pending secret.
    async fn enable_mfa(&self, user_id: i64) -> StoreResult<bool>;
    async fn disable_mfa(&self, user_id: i64) -> StoreResult<bool>;
    async fn replace_recovery_codes(&self, user_id: i64, codes: &[String]) -> StoreResult<bool>;
    /// Set the used bit for one code; false if it was already set.
    async fn mark_recovery_code_used(&self, user_id: i64, index: usize) -> StoreResult<bool>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> StoreResult<()>;
    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>>;
    async fn list_sessions(&self, user_id: i64) -> StoreResult<Vec<Session>>;
    async fn revoke_session(&self, user_id: i64, session_id: i64) -> StoreResult<bool>;
    /// Revoke every live session of the user except `keep`.
    async fn revoke_other_sessions(&self, user_id: i64, keep: Option<i64>) -> StoreResult<u64>;
    async fn elevate_session(&self, session_id: i64, until: DateTime<Utc>) -> StoreResult<bool>;

    // ==================== Applications ====================

    async fn insert_application(&self, application: &Application) -> StoreResult<()>;
    async fn find_application(&self, application_id: i64) -> StoreResult<Option<Application>>;
    async fn list_applications(&self, user_id: i64) -> StoreResult<Vec<Application>>;
    /// Save name, description and redirects; only for the owning user.
    async fn update_application(
        &self,
        user_id: i64,
        application: &Application,
    ) -> StoreResult<bool>;
    async fn delete_application(&self, user_id: i64, application_id: i64) -> StoreResult<bool>;
    async fn rotate_application_secret(
        &self,
        user_id: i64,
        application_id: i64,
        secret: &str,
    ) -> StoreResult<bool>;

    // ==================== Grants & Connections ====================

    async fn insert_grant(&self, grant: &Grant) -> StoreResult<()>;
    /// Delete and return the grant if it exists and has not expired.
    async fn consume_grant(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Grant>>;
    /// Insert, or reset the existing (user, application) row in place. Returns the stored row.
    async fn upsert_connection(&self, connection: &Connection) -> StoreResult<Connection>;
    async fn find_connection_by_access_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<Connection>>;
    async fn find_connection_by_refresh_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<Option<Connection>>;
    /// Swap both tokens of a live connection identified by its refresh token.
    async fn rotate_connection_tokens(
        &self,
        refresh_token: &str,
        application_id: i64,
        new_access: &str,
        new_refresh: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<Connection>>;
    /// Revoke by access or refresh token; false if unknown or already revoked.
    async fn revoke_connection_by_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<bool>;
    async fn list_connections(&self, user_id: i64) -> StoreResult<Vec<ConnectionSummary>>;
    async fn revoke_connection(&self, user_id: i64, connection_id: i64) -> StoreResult<bool>;
}
