//! PostgreSQL store (schema `auth`).
//!
//! Every statement runs under the configured timeout. Dropping the future (request
//! cancelled, shutdown) cancels the query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument};

use super::{IdentityStore, StoreError, StoreResult};
use crate::models::{
    Application, Connection, ConnectionSummary, Grant, Profile, Session, User,
};

const USER_COLUMNS: &str = "id, created, updated, email_address, email_verified, password_hash, \
     password_history, mfa_enabled, mfa_secret, mfa_codes, mfa_codes_used, permissions, \
     ip_address, token_verify, token_verify_eat, token_login, token_login_data, token_login_eat, \
     token_reset, token_reset_eat";

const SESSION_COLUMNS: &str =
    "id, created, user_id, token, revoked, elevated_until, device_ip_address, device_user_agent";

const PROFILE_COLUMNS: &str = "id, created, username, displayname, subtitle, biography, \
     accent_banner, accent_border, accent_background";

const APPLICATION_COLUMNS: &str =
    "id, created, user_id, name, description, auth_secret, auth_redirects";

const CONNECTION_COLUMNS: &str = "id, created, user_id, application_id, revoked, scopes, \
     token_access, token_refresh, token_expires";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    #[instrument(skip(url))]
    pub async fn connect(
        url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        info!(max_connections, "Connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))?;
        info!("PostgreSQL connection pool established");
        Ok(Self::new(pool, timeout))
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), anyhow::Error> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(map_sqlx),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("username") => "username",
                _ => "unique",
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Backend(anyhow::Error::new(err))
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.bounded(sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }

    // ==================== Users ====================

    async fn create_user(&self, user: &User, profile: &Profile) -> StoreResult<()> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO auth.users (
                    id, created, updated, email_address, password_hash, password_history,
                    ip_address, token_verify, token_verify_eat
                ) VALUES ($1, $2, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(user.id)
            .bind(user.created)
            .bind(&user.email_address)
            .bind(&user.password_hash)
            .bind(&user.password_history)
            .bind(&user.ip_address)
            .bind(&user.token_verify)
            .bind(user.token_verify_eat)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO auth.profiles (id, created, updated, username, displayname)
                VALUES ($1, $2, $2, $3, $4)
                "#,
            )
            .bind(profile.id)
            .bind(profile.created)
            .bind(&profile.username)
            .bind(&profile.displayname)
            .execute(&mut *tx)
            .await?;
            tx.commit().await
        })
        .await
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM auth.users WHERE id = $1");
        self.bounded(
            sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM auth.users WHERE email_address = LOWER($1)");
        self.bounded(
            sqlx::query_as::<_, User>(&sql)
                .bind(email.trim())
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM auth.profiles WHERE id = $1");
        self.bounded(
            sqlx::query_as::<_, Profile>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.profiles SET
                        updated = NOW(),
                        displayname = $2,
                        subtitle = $3,
                        biography = $4,
                        accent_banner = $5,
                        accent_border = $6,
                        accent_background = $7
                    WHERE id = $1
                    "#,
                )
                .bind(profile.id)
                .bind(&profile.displayname)
                .bind(&profile.subtitle)
                .bind(&profile.biography)
                .bind(profile.accent_banner)
                .bind(profile.accent_border)
                .bind(profile.accent_background)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn change_email(
        &self,
        user_id: i64,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        // The locked subquery still sees the old row, so RETURNING yields the previous address
        self.bounded(
            sqlx::query_scalar::<_, String>(
                r#"
                UPDATE auth.users u SET
                    updated = NOW(),
                    email_address = LOWER($2),
                    email_verified = FALSE,
                    token_verify = $3,
                    token_verify_eat = $4
                FROM (SELECT id, email_address FROM auth.users WHERE id = $1 FOR UPDATE) prev
                WHERE u.id = prev.id
                RETURNING prev.email_address
                "#,
            )
            .bind(user_id)
            .bind(email.trim())
            .bind(token)
            .bind(expires)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn refresh_verify_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        self.bounded(
            sqlx::query_scalar::<_, String>(
                r#"
                UPDATE auth.users SET
                    updated = NOW(),
                    token_verify = $2,
                    token_verify_eat = $3
                WHERE id = $1 AND email_verified = FALSE
                RETURNING email_address
                "#,
            )
            .bind(user_id)
            .bind(token)
            .bind(expires)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn consume_verify_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        updated = $2,
                        email_verified = TRUE,
                        token_verify = NULL,
                        token_verify_eat = NULL
                    WHERE token_verify = $1 AND token_verify_eat > $2
                    "#,
                )
                .bind(token)
                .bind(now)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_login_token(
        &self,
        user_id: i64,
        token: &str,
        ip_address: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        token_login = $2,
                        token_login_data = $3,
                        token_login_eat = $4
                    WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .bind(token)
                .bind(ip_address)
                .bind(expires)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_login_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        updated = $2,
                        ip_address = token_login_data,
                        token_login = NULL,
                        token_login_data = NULL,
                        token_login_eat = NULL
                    WHERE token_login = $1 AND token_login_eat > $2
                    "#,
                )
                .bind(token)
                .bind(now)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    "UPDATE auth.users SET token_reset = $2, token_reset_eat = $3 WHERE id = $1",
                )
                .bind(user_id)
                .bind(token)
                .bind(expires)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM auth.users WHERE token_reset = $1 AND token_reset_eat > $2"
        );
        self.bounded(
            sqlx::query_as::<_, User>(&sql)
                .bind(token)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        history: &[String],
        reset_token: Option<&str>,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        updated = NOW(),
                        password_hash = $2,
                        password_history = $3,
                        token_reset =
                            CASE WHEN $4::TEXT IS NULL THEN token_reset ELSE NULL END,
                        token_reset_eat =
                            CASE WHEN $4::TEXT IS NULL THEN token_reset_eat ELSE NULL END
                    WHERE id = $1 AND ($4::TEXT IS NULL OR token_reset = $4)
                    "#,
                )
                .bind(user_id)
                .bind(password_hash)
                .bind(history)
                .bind(reset_token)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, user_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM auth.users WHERE id = $1")
                    .bind(user_id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== MFA ====================

    async fn begin_mfa_setup(
        &self,
        user_id: i64,
        secret: &str,
        codes: &[String],
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        updated = NOW(),
                        mfa_secret = $2,
                        mfa_codes = $3,
                        mfa_codes_used = 0
                    WHERE id = $1 AND mfa_enabled = FALSE
                    "#,
                )
                .bind(user_id)
                .bind(secret)
                .bind(codes)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn enable_mfa(&self, user_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET updated = NOW(), mfa_enabled = TRUE
                    WHERE id = $1 AND mfa_enabled = FALSE AND mfa_secret IS NOT NULL
                    "#,
                )
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn disable_mfa(&self, user_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET
                        updated = NOW(),
                        mfa_enabled = FALSE,
                        mfa_secret = NULL,
                        mfa_codes = '{}',
                        mfa_codes_used = 0
                    WHERE id = $1 AND mfa_enabled = TRUE
                    "#,
                )
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_recovery_codes(&self, user_id: i64, codes: &[String]) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET updated = NOW(), mfa_codes = $2, mfa_codes_used = 0
                    WHERE id = $1 AND mfa_enabled = TRUE
                    "#,
                )
                .bind(user_id)
                .bind(codes)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_recovery_code_used(&self, user_id: i64, index: usize) -> StoreResult<bool> {
        let bit: i32 = 1 << index;
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.users SET updated = NOW(), mfa_codes_used = mfa_codes_used | $2
                    WHERE id = $1 AND mfa_enabled = TRUE AND (mfa_codes_used & $2) = 0
                    "#,
                )
                .bind(user_id)
                .bind(bit)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO auth.sessions (
                    id, created, user_id, token, revoked, elevated_until,
                    device_ip_address, device_user_agent
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(session.id)
            .bind(session.created)
            .bind(session.user_id)
            .bind(&session.token)
            .bind(session.revoked)
            .bind(session.elevated_until)
            .bind(&session.device_ip_address)
            .bind(&session.device_user_agent)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM auth.sessions WHERE token = $1");
        self.bounded(
            sqlx::query_as::<_, Session>(&sql)
                .bind(token)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn list_sessions(&self, user_id: i64) -> StoreResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM auth.sessions \
             WHERE user_id = $1 AND revoked = FALSE ORDER BY id"
        );
        self.bounded(
            sqlx::query_as::<_, Session>(&sql)
                .bind(user_id)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn revoke_session(&self, user_id: i64, session_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.sessions SET revoked = TRUE
                    WHERE id = $1 AND user_id = $2 AND revoked = FALSE
                    "#,
                )
                .bind(session_id)
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_other_sessions(&self, user_id: i64, keep: Option<i64>) -> StoreResult<u64> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.sessions SET revoked = TRUE
                    WHERE user_id = $1 AND revoked = FALSE AND ($2::BIGINT IS NULL OR id <> $2)
                    "#,
                )
                .bind(user_id)
                .bind(keep)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    async fn elevate_session(&self, session_id: i64, until: DateTime<Utc>) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.sessions SET elevated_until = $2
                    WHERE id = $1 AND revoked = FALSE
                    "#,
                )
                .bind(session_id)
                .bind(until)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Applications ====================

    async fn insert_application(&self, application: &Application) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO auth.applications (
                    id, created, updated, user_id, name, description, auth_secret, auth_redirects
                ) VALUES ($1, $2, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(application.id)
            .bind(application.created)
            .bind(application.user_id)
            .bind(&application.name)
            .bind(&application.description)
            .bind(&application.auth_secret)
            .bind(&application.auth_redirects)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn find_application(&self, application_id: i64) -> StoreResult<Option<Application>> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM auth.applications WHERE id = $1");
        self.bounded(
            sqlx::query_as::<_, Application>(&sql)
                .bind(application_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn list_applications(&self, user_id: i64) -> StoreResult<Vec<Application>> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM auth.applications WHERE user_id = $1 ORDER BY id"
        );
        self.bounded(
            sqlx::query_as::<_, Application>(&sql)
                .bind(user_id)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn update_application(
        &self,
        user_id: i64,
        application: &Application,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.applications SET
                        updated = NOW(),
                        name = $3,
                        description = $4,
                        auth_redirects = $5
                    WHERE id = $1 AND user_id = $2
                    "#,
                )
                .bind(application.id)
                .bind(user_id)
                .bind(&application.name)
                .bind(&application.description)
                .bind(&application.auth_redirects)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_application(&self, user_id: i64, application_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM auth.applications WHERE id = $1 AND user_id = $2")
                    .bind(application_id)
                    .bind(user_id)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate_application_secret(
        &self,
        user_id: i64,
        application_id: i64,
        secret: &str,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.applications SET updated = NOW(), auth_secret = $3
                    WHERE id = $1 AND user_id = $2
                    "#,
                )
                .bind(application_id)
                .bind(user_id)
                .bind(secret)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Grants & Connections ====================

    async fn insert_grant(&self, grant: &Grant) -> StoreResult<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO auth.grants (
                    id, code, expires, user_id, application_id, redirect_uri, scopes
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(grant.id)
            .bind(&grant.code)
            .bind(grant.expires)
            .bind(grant.user_id)
            .bind(grant.application_id)
            .bind(&grant.redirect_uri)
            .bind(grant.scopes)
            .execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    async fn consume_grant(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Grant>> {
        self.bounded(
            sqlx::query_as::<_, Grant>(
                r#"
                DELETE FROM auth.grants
                WHERE code = $1 AND expires > $2
                RETURNING id, code, expires, user_id, application_id, redirect_uri, scopes
                "#,
            )
            .bind(code)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn upsert_connection(&self, connection: &Connection) -> StoreResult<Connection> {
        let sql = format!(
            r#"
            INSERT INTO auth.connections (
                id, created, updated, user_id, application_id, revoked, scopes,
                token_access, token_refresh, token_expires
            ) VALUES ($1, $2, $2, $3, $4, FALSE, $5, $6, $7, $8)
            ON CONFLICT (user_id, application_id) DO UPDATE SET
                updated = EXCLUDED.updated,
                revoked = FALSE,
                scopes = EXCLUDED.scopes,
                token_access = EXCLUDED.token_access,
                token_refresh = EXCLUDED.token_refresh,
                token_expires = EXCLUDED.token_expires
            RETURNING {CONNECTION_COLUMNS}
            "#
        );
        self.bounded(
            sqlx::query_as::<_, Connection>(&sql)
                .bind(connection.id)
                .bind(connection.created)
                .bind(connection.user_id)
                .bind(connection.application_id)
                .bind(connection.scopes)
                .bind(&connection.token_access)
                .bind(&connection.token_refresh)
                .bind(connection.token_expires)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_connection_by_access_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<Connection>> {
        let sql =
            format!("SELECT {CONNECTION_COLUMNS} FROM auth.connections WHERE token_access = $1");
        self.bounded(
            sqlx::query_as::<_, Connection>(&sql)
                .bind(token)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_connection_by_refresh_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<Option<Connection>> {
        let sql = format!(
            "SELECT {CONNECTION_COLUMNS} FROM auth.connections \
             WHERE token_refresh = $1 AND application_id = $2"
        );
        self.bounded(
            sqlx::query_as::<_, Connection>(&sql)
                .bind(token)
                .bind(application_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn rotate_connection_tokens(
        &self,
        refresh_token: &str,
        application_id: i64,
        new_access: &str,
        new_refresh: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<Connection>> {
        let sql = format!(
            r#"
            UPDATE auth.connections SET
                updated = NOW(),
                token_access = $3,
                token_refresh = $4,
                token_expires = $5
            WHERE token_refresh = $1 AND application_id = $2 AND revoked = FALSE
            RETURNING {CONNECTION_COLUMNS}
            "#
        );
        self.bounded(
            sqlx::query_as::<_, Connection>(&sql)
                .bind(refresh_token)
                .bind(application_id)
                .bind(new_access)
                .bind(new_refresh)
                .bind(expires)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn revoke_connection_by_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.connections SET updated = NOW(), revoked = TRUE
                    WHERE (token_access = $1 OR token_refresh = $1)
                    AND application_id = $2
                    AND revoked = FALSE
                    "#,
                )
                .bind(token)
                .bind(application_id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_connections(&self, user_id: i64) -> StoreResult<Vec<ConnectionSummary>> {
        self.bounded(
            sqlx::query_as::<_, ConnectionSummary>(
                r#"
                SELECT
                    c.id, c.created, c.scopes,
                    a.id AS application_id, a.name AS application_name
                FROM auth.connections c
                INNER JOIN auth.applications a ON c.application_id = a.id
                WHERE c.user_id = $1 AND c.revoked = FALSE
                ORDER BY c.id
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn revoke_connection(&self, user_id: i64, connection_id: i64) -> StoreResult<bool> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    UPDATE auth.connections SET updated = NOW(), revoked = TRUE
                    WHERE id = $1 AND user_id = $2 AND revoked = FALSE
                    "#,
                )
                .bind(connection_id)
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
