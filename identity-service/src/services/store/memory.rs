//! In-process store used by tests and local runs without a database.
//!
//! One mutex guards all tables, so every method is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{IdentityStore, StoreError, StoreResult};
use crate::models::{
    Application, Connection, ConnectionSummary, Grant, Profile, Session, User,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, Profile>,
    sessions: BTreeMap<i64, Session>,
    applications: BTreeMap<i64, Application>,
    grants: BTreeMap<i64, Grant>,
    connections: BTreeMap<i64, Connection>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    // ==================== Users ====================

    async fn create_user(&self, user: &User, profile: &Profile) -> StoreResult<()> {
        let mut t = self.lock();
        if t.users
            .values()
            .any(|u| u.email_address == user.email_address)
        {
            return Err(StoreError::Conflict("email"));
        }
        if t.profiles.values().any(|p| p.username == profile.username) {
            return Err(StoreError::Conflict("username"));
        }
        t.users.insert(user.id, user.clone());
        t.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email_address == email)
            .cloned())
    }

    async fn find_profile(&self, user_id: i64) -> StoreResult<Option<Profile>> {
        Ok(self.lock().profiles.get(&user_id).cloned())
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.profiles.get_mut(&profile.id) {
            Some(row) => {
                row.displayname = profile.displayname.clone();
                row.subtitle = profile.subtitle.clone();
                row.biography = profile.biography.clone();
                row.accent_banner = profile.accent_banner;
                row.accent_border = profile.accent_border;
                row.accent_background = profile.accent_background;
                true
            }
            None => false,
        })
    }

    async fn change_email(
        &self,
        user_id: i64,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        let email = email.trim().to_lowercase();
        let mut t = self.lock();
        if t.users
            .values()
            .any(|u| u.id != user_id && u.email_address == email)
        {
            return Err(StoreError::Conflict("email"));
        }
        Ok(t.users.get_mut(&user_id).map(|user| {
            user.email_verified = false;
            user.token_verify = Some(token.to_string());
            user.token_verify_eat = Some(expires);
            std::mem::replace(&mut user.email_address, email)
        }))
    }

    async fn refresh_verify_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if !user.email_verified => {
                user.token_verify = Some(token.to_string());
                user.token_verify_eat = Some(expires);
                Some(user.email_address.clone())
            }
            _ => None,
        })
    }

    async fn consume_verify_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut t = self.lock();
        let user = t.users.values_mut().find(|u| {
            u.token_verify.as_deref() == Some(token)
                && u.token_verify_eat.is_some_and(|eat| eat > now)
        });
        Ok(match user {
            Some(user) => {
                user.email_verified = true;
                user.token_verify = None;
                user.token_verify_eat = None;
                user.updated = now;
                true
            }
            None => false,
        })
    }

    async fn set_login_token(
        &self,
        user_id: i64,
        token: &str,
        ip_address: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) => {
                user.token_login = Some(token.to_string());
                user.token_login_data = Some(ip_address.to_string());
                user.token_login_eat = Some(expires);
                true
            }
            None => false,
        })
    }

    async fn consume_login_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut t = self.lock();
        let user = t.users.values_mut().find(|u| {
            u.token_login.as_deref() == Some(token)
                && u.token_login_eat.is_some_and(|eat| eat > now)
        });
        Ok(match user {
            Some(user) => {
                user.ip_address = user.token_login_data.take();
                user.token_login = None;
                user.token_login_eat = None;
                user.updated = now;
                true
            }
            None => false,
        })
    }

    async fn set_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) => {
                user.token_reset = Some(token.to_string());
                user.token_reset_eat = Some(expires);
                true
            }
            None => false,
        })
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| {
                u.token_reset.as_deref() == Some(token)
                    && u.token_reset_eat.is_some_and(|eat| eat > now)
            })
            .cloned())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        history: &[String],
        reset_token: Option<&str>,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        let Some(user) = t.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(token) = reset_token {
            if user.token_reset.as_deref() != Some(token) {
                return Ok(false);
            }
            user.token_reset = None;
            user.token_reset_eat = None;
        }
        user.password_hash = Some(password_hash.to_string());
        user.password_history = history.to_vec();
        Ok(true)
    }

    async fn delete_user(&self, user_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        if t.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        t.profiles.remove(&user_id);
        t.sessions.retain(|_, s| s.user_id != user_id);
        let owned: Vec<i64> = t
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.id)
            .collect();
        t.applications.retain(|_, a| a.user_id != user_id);
        t.grants
            .retain(|_, g| g.user_id != user_id && !owned.contains(&g.application_id));
        t.connections
            .retain(|_, c| c.user_id != user_id && !owned.contains(&c.application_id));
        Ok(true)
    }

    // ==================== MFA ====================

    async fn begin_mfa_setup(
        &self,
        user_id: i64,
        secret: &str,
        codes: &[String],
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if !user.mfa_enabled => {
                user.mfa_secret = Some(secret.to_string());
                user.mfa_codes = codes.to_vec();
                user.mfa_codes_used = 0;
                true
            }
            _ => false,
        })
    }

    async fn enable_mfa(&self, user_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if !user.mfa_enabled && user.mfa_secret.is_some() => {
                user.mfa_enabled = true;
                true
            }
            _ => false,
        })
    }

    async fn disable_mfa(&self, user_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if user.mfa_enabled => {
                user.mfa_enabled = false;
                user.mfa_secret = None;
                user.mfa_codes.clear();
                user.mfa_codes_used = 0;
                true
            }
            _ => false,
        })
    }

    async fn replace_recovery_codes(&self, user_id: i64, codes: &[String]) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if user.mfa_enabled => {
                user.mfa_codes = codes.to_vec();
                user.mfa_codes_used = 0;
                true
            }
            _ => false,
        })
    }

    async fn mark_recovery_code_used(&self, user_id: i64, index: usize) -> StoreResult<bool> {
        let bit = 1i32 << index;
        let mut t = self.lock();
        Ok(match t.users.get_mut(&user_id) {
            Some(user) if user.mfa_enabled && user.mfa_codes_used & bit == 0 => {
                user.mfa_codes_used |= bit;
                true
            }
            _ => false,
        })
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        self.lock().sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn list_sessions(&self, user_id: i64) -> StoreResult<Vec<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && !s.revoked)
            .cloned()
            .collect())
    }

    async fn revoke_session(&self, user_id: i64, session_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.sessions.get_mut(&session_id) {
            Some(s) if s.user_id == user_id && !s.revoked => {
                s.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_other_sessions(&self, user_id: i64, keep: Option<i64>) -> StoreResult<u64> {
        let mut t = self.lock();
        let mut revoked = 0;
        for s in t.sessions.values_mut() {
            if s.user_id == user_id && !s.revoked && Some(s.id) != keep {
                s.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn elevate_session(&self, session_id: i64, until: DateTime<Utc>) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.sessions.get_mut(&session_id) {
            Some(s) if !s.revoked => {
                s.elevated_until = Some(until);
                true
            }
            _ => false,
        })
    }

    // ==================== Applications ====================

    async fn insert_application(&self, application: &Application) -> StoreResult<()> {
        self.lock()
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn find_application(&self, application_id: i64) -> StoreResult<Option<Application>> {
        Ok(self.lock().applications.get(&application_id).cloned())
    }

    async fn list_applications(&self, user_id: i64) -> StoreResult<Vec<Application>> {
        Ok(self
            .lock()
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_application(
        &self,
        user_id: i64,
        application: &Application,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.applications.get_mut(&application.id) {
            Some(row) if row.user_id == user_id => {
                row.name = application.name.clone();
                row.description = application.description.clone();
                row.auth_redirects = application.auth_redirects.clone();
                true
            }
            _ => false,
        })
    }

    async fn delete_application(&self, user_id: i64, application_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        match t.applications.get(&application_id) {
            Some(app) if app.user_id == user_id => {}
            _ => return Ok(false),
        }
        t.applications.remove(&application_id);
        t.grants.retain(|_, g| g.application_id != application_id);
        t.connections.retain(|_, c| c.application_id != application_id);
        Ok(true)
    }

    async fn rotate_application_secret(
        &self,
        user_id: i64,
        application_id: i64,
        secret: &str,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.applications.get_mut(&application_id) {
            Some(app) if app.user_id == user_id => {
                app.auth_secret = secret.to_string();
                true
            }
            _ => false,
        })
    }

    // ==================== Grants & Connections ====================

    async fn insert_grant(&self, grant: &Grant) -> StoreResult<()> {
        self.lock().grants.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn consume_grant(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Grant>> {
        let mut t = self.lock();
        let id = t
            .grants
            .values()
            .find(|g| g.code == code && g.expires > now)
            .map(|g| g.id);
        Ok(id.and_then(|id| t.grants.remove(&id)))
    }

    async fn upsert_connection(&self, connection: &Connection) -> StoreResult<Connection> {
        let mut t = self.lock();
        let existing = t
            .connections
            .values_mut()
            .find(|c| {
                c.user_id == connection.user_id && c.application_id == connection.application_id
            });
        if let Some(row) = existing {
            row.revoked = false;
            row.scopes = connection.scopes;
            row.token_access = connection.token_access.clone();
            row.token_refresh = connection.token_refresh.clone();
            row.token_expires = connection.token_expires;
            return Ok(row.clone());
        }
        t.connections.insert(connection.id, connection.clone());
        Ok(connection.clone())
    }

    async fn find_connection_by_access_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<Connection>> {
        Ok(self
            .lock()
            .connections
            .values()
            .find(|c| c.token_access == token)
            .cloned())
    }

    async fn find_connection_by_refresh_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<Option<Connection>> {
        Ok(self
            .lock()
            .connections
            .values()
            .find(|c| c.token_refresh == token && c.application_id == application_id)
            .cloned())
    }

    async fn rotate_connection_tokens(
        &self,
        refresh_token: &str,
        application_id: i64,
        new_access: &str,
        new_refresh: &str,
        expires: DateTime<Utc>,
    ) -> StoreResult<Option<Connection>> {
        let mut t = self.lock();
        let row = t.connections.values_mut().find(|c| {
            c.token_refresh == refresh_token && c.application_id == application_id && !c.revoked
        });
        Ok(row.map(|c| {
            c.token_access = new_access.to_string();
            c.token_refresh = new_refresh.to_string();
            c.token_expires = expires;
            c.clone()
        }))
    }

    async fn revoke_connection_by_token(
        &self,
        token: &str,
        application_id: i64,
    ) -> StoreResult<bool> {
        let mut t = self.lock();
        let row = t.connections.values_mut().find(|c| {
            (c.token_access == token || c.token_refresh == token)
                && c.application_id == application_id
                && !c.revoked
        });
        Ok(match row {
            Some(c) => {
                c.revoked = true;
                true
            }
            None => false,
        })
    }

    async fn list_connections(&self, user_id: i64) -> StoreResult<Vec<ConnectionSummary>> {
        let t = self.lock();
        Ok(t.connections
            .values()
            .filter(|c| c.user_id == user_id && !c.revoked)
            .filter_map(|c| {
                let app = t.applications.get(&c.application_id)?;
                Some(ConnectionSummary {
                    id: c.id,
                    created: c.created,
                    scopes: c.scopes,
                    application_id: app.id,
                    application_name: app.name.clone(),
                })
            })
            .collect())
    }

    async fn revoke_connection(&self, user_id: i64, connection_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        Ok(match t.connections.get_mut(&connection_id) {
            Some(c) if c.user_id == user_id && !c.revoked => {
                c.revoked = true;
                true
            }
            _ => false,
        })
    }
}
