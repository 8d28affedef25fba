//! Signup, login and everything a user does to their own account.

use chrono::Duration;
use std::net::IpAddr;
use std::sync::Arc;

use crate::dtos::auth::{LoginRequest, SignupRequest};
use crate::dtos::users::{
    MeResponse, PublicProfileResponse, SessionsResponse, UpdateProfileRequest,
};
use crate::models::{
    push_password_history, ConnectionInfo, Profile, Scopes, Session, SessionContext, SessionInfo,
    User, EMAIL_TOKEN_LIFETIME_SECONDS,
};
use crate::services::background::BackgroundQueue;
use crate::services::clock::Clock;
use crate::services::email::{EmailProvider, Notification};
use crate::services::geolocation::{GeolocationProvider, UNKNOWN_LOCATION};
use crate::services::mfa::MfaService;
use crate::services::snowflake::SnowflakeGenerator;
use crate::services::storage::StorageProvider;
use crate::services::store::{IdentityStore, StoreError};
use crate::services::ServiceError;
use crate::utils::{generate_token, hash_password, verify_password, Password};

/// Where a request came from, as recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct Device {
    pub ip_address: Option<IpAddr>,
    pub user_agent: String,
}

/// Outbound side effects shared by every account operation.
#[derive(Clone)]
pub struct Notifier {
    email: Arc<dyn EmailProvider>,
    storage: Arc<dyn StorageProvider>,
    background: BackgroundQueue,
}

impl Notifier {
    pub fn new(
        email: Arc<dyn EmailProvider>,
        storage: Arc<dyn StorageProvider>,
        background: BackgroundQueue,
    ) -> Self {
        Self {
            email,
            storage,
            background,
        }
    }

    pub(crate) fn email(&self, to: String, notification: Notification) {
        let email = Arc::clone(&self.email);
        self.background.submit(notification.kind(), async move {
            email.send(&to, notification).await
        });
    }

    pub(crate) fn delete_assets(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        let storage = Arc::clone(&self.storage);
        self.background
            .submit("delete_assets", async move { storage.delete(&paths).await });
    }
}

/// Per-user asset folders. Missing ones are ignored by storage.
fn asset_paths(user_id: i64, application_ids: &[i64]) -> Vec<String> {
    let mut paths = vec![format!("avatars/{user_id}"), format!("banners/{user_id}")];
    paths.extend(application_ids.iter().map(|id| format!("icons/{id}")));
    paths
}

/// Empty strings and zero accents clear a field; an empty display name reverts to the username.
fn apply_profile_update(profile: &mut Profile, req: UpdateProfileRequest) {
    fn text(value: String) -> Option<String> {
        (!value.is_empty()).then_some(value)
    }
    fn accent(value: i32) -> Option<i32> {
        (value != 0).then_some(value)
    }

    if let Some(name) = req.displayname {
        profile.displayname = text(name).unwrap_or_else(|| profile.username.clone());
    }
    if let Some(subtitle) = req.subtitle {
        profile.subtitle = text(subtitle);
    }
    if let Some(biography) = req.biography {
        profile.biography = text(biography);
    }
    if let Some(color) = req.accent_banner {
        profile.accent_banner = accent(color);
    }
    if let Some(color) = req.accent_border {
        profile.accent_border = accent(color);
    }
    if let Some(color) = req.accent_background {
        profile.accent_background = accent(color);
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<SnowflakeGenerator>,
    geolocation: Arc<dyn GeolocationProvider>,
    notifier: Notifier,
    mfa: MfaService,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<SnowflakeGenerator>,
        geolocation: Arc<dyn GeolocationProvider>,
        notifier: Notifier,
        mfa: MfaService,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            geolocation,
            notifier,
            mfa,
        }
    }

    async fn load_user(&self, user_id: i64) -> Result<(User, Profile), ServiceError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)?;
        let profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)?;
        Ok((user, profile))
    }

    async fn locate(&self, ip_address: &str) -> String {
        match ip_address.parse::<IpAddr>() {
            Ok(ip) => self.geolocation.locate(ip).await,
            Err(_) => UNKNOWN_LOCATION.to_string(),
        }
    }

    /// Reject a password matching any remembered hash.
    fn check_history(user: &User, password: &Password) -> Result<(), ServiceError> {
        for previous in &user.password_history {
            if verify_password(password, previous)? {
                return Err(ServiceError::PasswordAlreadyUsed);
            }
        }
        Ok(())
    }

    // ==================== Signup & verification ====================

    pub async fn signup(&self, req: SignupRequest, device: &Device) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let password_hash = hash_password(&Password::new(req.password))?;
        let token = generate_token();

        let mut user = User::new(
            self.ids.next_id(),
            &req.email,
            password_hash,
            device.ip_address.map(|ip| ip.to_string()),
            now,
        );
        user.token_verify = Some(token.clone());
        user.token_verify_eat = Some(now + Duration::seconds(EMAIL_TOKEN_LIFETIME_SECONDS));
        let profile = Profile::new(user.id, req.username, now);

        self.store
            .create_user(&user, &profile)
            .await
            .map_err(|e| match e {
                StoreError::Conflict("email") => ServiceError::DuplicateEmail,
                StoreError::Conflict("username") => ServiceError::DuplicateUsername,
                other => ServiceError::Store(other),
            })?;

        tracing::info!(user_id = user.id, "User signed up");
        self.notifier.email(
            user.email_address,
            Notification::VerifyEmail {
                displayname: profile.displayname,
                token,
            },
        );
        Ok(())
    }

    /// Email a fresh verify token, while the address is still unverified.
    pub async fn resend_verification(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        ctx.require_user()?;
        let (user, profile) = self.load_user(ctx.user_id).await?;
        if user.email_verified {
            return Err(ServiceError::EmailAlreadyVerified);
        }

        let token = generate_token();
        let expires = self.clock.now() + Duration::seconds(EMAIL_TOKEN_LIFETIME_SECONDS);
        let email = self
            .store
            .refresh_verify_token(user.id, &token, expires)
            .await?
            .ok_or(ServiceError::EmailAlreadyVerified)?;

        self.notifier.email(
            email,
            Notification::VerifyEmail {
                displayname: profile.displayname,
                token,
            },
        );
        Ok(())
    }

    /// Move the account to a new, unverified address. The old one is told about it.
    pub async fn change_email(
        &self,
        ctx: &SessionContext,
        email: &str,
    ) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        let (user, profile) = self.load_user(ctx.user_id).await?;
        let email = email.trim().to_lowercase();
        if email == user.email_address {
            return Err(ServiceError::DuplicateEmail);
        }

        let token = generate_token();
        let expires = self.clock.now() + Duration::seconds(EMAIL_TOKEN_LIFETIME_SECONDS);
        let previous = self
            .store
            .change_email(user.id, &email, &token, expires)
            .await
            .map_err(|e| match e {
                StoreError::Conflict("email") => ServiceError::DuplicateEmail,
                other => ServiceError::Store(other),
            })?
            .ok_or(ServiceError::UnknownUser)?;

        tracing::info!(user_id = user.id, "Email address changed");
        self.notifier.email(
            email,
            Notification::VerifyEmail {
                displayname: profile.displayname.clone(),
                token,
            },
        );
        self.notifier.email(
            previous,
            Notification::EmailModified {
                displayname: profile.displayname,
            },
        );
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        if !self
            .store
            .consume_verify_token(token, self.clock.now())
            .await?
        {
            return Err(ServiceError::UnknownToken);
        }
        Ok(())
    }

    /// Approve a login from a new address; the next login from there goes through.
    pub async fn verify_login(&self, token: &str) -> Result<(), ServiceError> {
        if !self
            .store
            .consume_login_token(token, self.clock.now())
            .await?
        {
            return Err(ServiceError::UnknownToken);
        }
        Ok(())
    }

    // ==================== Login ====================

    pub async fn login(&self, req: LoginRequest, device: &Device) -> Result<Session, ServiceError> {
        let user = self
            .store
            .find_user_by_email(&req.email)
            .await?
            .ok_or(ServiceError::LoginIncorrect)?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(ServiceError::PasswordResetRequired)?;
        if !verify_password(&Password::new(req.password), hash)? {
            tracing::info!(user_id = user.id, "Login rejected: wrong password");
            return Err(ServiceError::LoginIncorrect);
        }

        let ip_address = device.ip_address.map(|ip| ip.to_string());
        if user.mfa_enabled {
            self.mfa
                .verify_passcode(&user, req.passcode.as_deref())
                .await?;
        } else if let Some(ip) = ip_address.as_deref() {
            let known = user.ip_address.as_deref();
            if user.email_verified && known.is_some_and(|known| known != ip) {
                return Err(self.challenge_new_location(&user, ip).await?);
            }
        }

        let session = Session {
            id: self.ids.next_id(),
            created: self.clock.now(),
            user_id: user.id,
            token: generate_token(),
            revoked: false,
            elevated_until: None,
            device_ip_address: ip_address.unwrap_or_default(),
            device_user_agent: device.user_agent.clone(),
        };
        self.store.insert_session(&session).await?;

        tracing::info!(user_id = user.id, session_id = session.id, "User logged in");
        Ok(session)
    }

    /// Park the login and email a confirmation token. Returns the error to report.
    async fn challenge_new_location(
        &self,
        user: &User,
        ip_address: &str,
    ) -> Result<ServiceError, ServiceError> {
        let token = generate_token();
        let expires = self.clock.now() + Duration::seconds(EMAIL_TOKEN_LIFETIME_SECONDS);
        if !self
            .store
            .set_login_token(user.id, &token, ip_address, expires)
            .await?
        {
            return Err(ServiceError::UnknownUser);
        }

        let (_, profile) = self.load_user(user.id).await?;
        let location = self.locate(ip_address).await;
        tracing::info!(
            user_id = user.id,
            %location,
            "Login from new location held for confirmation"
        );
        self.notifier.email(
            user.email_address.clone(),
            Notification::VerifyLogin {
                displayname: profile.displayname,
                token,
                location,
            },
        );
        Ok(ServiceError::LoginEmailSent)
    }

    pub async fn logout(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        let session_id = ctx.require_user()?;
        self.store.revoke_session(ctx.user_id, session_id).await?;
        tracing::info!(user_id = ctx.user_id, session_id, "User logged out");
        Ok(())
    }

    // ==================== Passwords ====================

    /// Always succeeds from the caller's point of view so addresses cannot be probed.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(());
        };
        let token = generate_token();
        let expires = self.clock.now() + Duration::seconds(EMAIL_TOKEN_LIFETIME_SECONDS);
        if !self.store.set_reset_token(user.id, &token, expires).await? {
            return Ok(());
        }

        let (_, profile) = self.load_user(user.id).await?;
        self.notifier.email(
            user.email_address,
            Notification::PasswordReset {
                displayname: profile.displayname,
                token,
            },
        );
        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        token: &str,
        password: Password,
    ) -> Result<(), ServiceError> {
        let user = self
            .store
            .find_user_by_reset_token(token, self.clock.now())
            .await?
            .ok_or(ServiceError::UnknownToken)?;
        Self::check_history(&user, &password)?;

        let hash = hash_password(&password)?;
        let history = push_password_history(&user.password_history, hash.clone());
        if !self
            .store
            .update_password(user.id, &hash, &history, Some(token))
            .await?
        {
            return Err(ServiceError::UnknownToken);
        }
        let revoked = self.store.revoke_other_sessions(user.id, None).await?;
        tracing::info!(user_id = user.id, revoked, "Password reset");

        if let Some(profile) = self.store.find_profile(user.id).await? {
            self.notifier.email(
                user.email_address,
                Notification::PasswordModified {
                    displayname: profile.displayname,
                },
            );
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        ctx: &SessionContext,
        old_password: Password,
        new_password: Password,
    ) -> Result<(), ServiceError> {
        let session_id = ctx.require_user()?;
        let (user, profile) = self.load_user(ctx.user_id).await?;
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(ServiceError::PasswordResetRequired)?;
        if !verify_password(&old_password, hash)? {
            return Err(ServiceError::PasswordIncorrect);
        }
        Self::check_history(&user, &new_password)?;

        let new_hash = hash_password(&new_password)?;
        let history = push_password_history(&user.password_history, new_hash.clone());
        if !self
            .store
            .update_password(user.id, &new_hash, &history, None)
            .await?
        {
            return Err(ServiceError::UnknownUser);
        }
        let revoked = self
            .store
            .revoke_other_sessions(user.id, Some(session_id))
            .await?;
        tracing::info!(user_id = user.id, revoked, "Password changed");

        self.notifier.email(
            user.email_address,
            Notification::PasswordModified {
                displayname: profile.displayname,
            },
        );
        Ok(())
    }

    // ==================== Profile ====================

    pub async fn me(&self, ctx: &SessionContext) -> Result<MeResponse, ServiceError> {
        ctx.require_scopes(Scopes::IDENTIFY)?;
        let (user, profile) = self.load_user(ctx.user_id).await?;
        Ok(MeResponse {
            id: user.id.to_string(),
            created: user.created,
            username: profile.username,
            displayname: profile.displayname,
            email: ctx
                .has_scopes(Scopes::EMAIL)
                .then_some(user.email_address),
            verified: user.email_verified,
            mfa_enabled: user.mfa_enabled,
        })
    }

    pub async fn public_profile(
        &self,
        user_id: i64,
    ) -> Result<PublicProfileResponse, ServiceError> {
        let profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)?;
        Ok(profile.into())
    }

    pub async fn update_profile(
        &self,
        ctx: &SessionContext,
        req: UpdateProfileRequest,
    ) -> Result<PublicProfileResponse, ServiceError> {
        ctx.require_user()?;
        if req.is_empty() {
            return Err(ServiceError::EmptyBody);
        }
        let mut profile = self
            .store
            .find_profile(ctx.user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)?;
        apply_profile_update(&mut profile, req);

        if !self.store.update_profile(&profile).await? {
            return Err(ServiceError::UnknownUser);
        }
        tracing::info!(user_id = ctx.user_id, "Profile updated");
        Ok(profile.into())
    }

    pub async fn delete_account(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        let (user, profile) = self.load_user(ctx.user_id).await?;
        let application_ids: Vec<i64> = self
            .store
            .list_applications(user.id)
            .await?
            .iter()
            .map(|app| app.id)
            .collect();

        if !self.store.delete_user(user.id).await? {
            return Err(ServiceError::UnknownUser);
        }
        tracing::info!(user_id = user.id, "Account deleted");

        self.notifier
            .delete_assets(asset_paths(user.id, &application_ids));
        self.notifier.email(
            user.email_address,
            Notification::AccountDeleted {
                displayname: profile.displayname,
            },
        );
        Ok(())
    }

    // ==================== Sessions & connections ====================

    pub async fn list_sessions(
        &self,
        ctx: &SessionContext,
    ) -> Result<SessionsResponse, ServiceError> {
        let current = ctx.require_user()?;
        let sessions = self.store.list_sessions(ctx.user_id).await?;

        let mut entries = Vec::with_capacity(sessions.len());
        for session in sessions {
            entries.push(SessionInfo {
                id: session.id.to_string(),
                created: session.created,
                location: self.locate(&session.device_ip_address).await,
                user_agent: session.device_user_agent,
            });
        }
        Ok(SessionsResponse {
            current: current.to_string(),
            sessions: entries,
        })
    }

    pub async fn revoke_session(
        &self,
        ctx: &SessionContext,
        session_id: i64,
    ) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        if !self.store.revoke_session(ctx.user_id, session_id).await? {
            return Err(ServiceError::UnknownSession);
        }
        tracing::info!(user_id = ctx.user_id, session_id, "Session revoked");
        Ok(())
    }

    pub async fn list_connections(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<ConnectionInfo>, ServiceError> {
        ctx.require_user()?;
        Ok(self
            .store
            .list_connections(ctx.user_id)
            .await?
            .into_iter()
            .map(ConnectionInfo::from)
            .collect())
    }

    pub async fn revoke_connection(
        &self,
        ctx: &SessionContext,
        connection_id: i64,
    ) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        if !self
            .store
            .revoke_connection(ctx.user_id, connection_id)
            .await?
        {
            return Err(ServiceError::UnknownConnection);
        }
        tracing::info!(user_id = ctx.user_id, connection_id, "Connection revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration as StdDuration;

    use crate::models::NO_APPLICATION;
    use crate::services::clock::ManualClock;
    use crate::services::email::MockEmailService;
    use crate::services::geolocation::MockGeolocation;
    use crate::services::storage::MockStorage;
    use crate::services::store::MemoryStore;

    struct Fixture {
        service: AccountService,
        store: Arc<MemoryStore>,
        email: Arc<MockEmailService>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let email = Arc::new(MockEmailService::new());
        let (background, _worker) = BackgroundQueue::start(16);
        let notifier = Notifier::new(email.clone(), Arc::new(MockStorage::new()), background);
        let mfa = MfaService::new(store.clone(), clock.clone(), "Test".to_string());
        let service = AccountService::new(
            store.clone(),
            clock,
            Arc::new(SnowflakeGenerator::new(2).unwrap()),
            Arc::new(MockGeolocation::new().with("198.51.100.7".parse().unwrap(), "Lisbon, PT")),
            notifier,
            mfa,
        );
        Fixture {
            service,
            store,
            email,
        }
    }

    fn device(ip: &str) -> Device {
        Device {
            ip_address: Some(ip.parse().unwrap()),
            user_agent: "test-agent".to_string(),
        }
    }

    fn signup_request(email: &str, username: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
        }
    }

    fn login_request(password: &str) -> LoginRequest {
        LoginRequest {
            email: "alice@example.com".to_string(),
            password: password.to_string(),
            passcode: None,
        }
    }

    async fn wait_for_mail(email: &MockEmailService, count: usize) -> Vec<(String, Notification)> {
        for _ in 0..100 {
            let sent = email.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("expected {count} emails, got {:?}", email.sent());
    }

    fn token_of(notification: &Notification) -> String {
        match notification {
            Notification::VerifyEmail { token, .. }
            | Notification::VerifyLogin { token, .. }
            | Notification::PasswordReset { token, .. } => token.clone(),
            other => panic!("no token in {other:?}"),
        }
    }

    fn user_context(session: &Session) -> SessionContext {
        SessionContext {
            user_id: session.user_id,
            session_id: Some(session.id),
            connection_id: None,
            application_id: NO_APPLICATION,
            scopes: Scopes::NONE,
            elevated: false,
        }
    }

    #[tokio::test]
    async fn signup_rejects_duplicates() {
        let f = fixture();
        let home = device("203.0.113.1");
        f.service
            .signup(signup_request("alice@example.com", "alice"), &home)
            .await
            .unwrap();

        assert!(matches!(
            f.service
                .signup(signup_request("ALICE@example.com", "other"), &home)
                .await,
            Err(ServiceError::DuplicateEmail)
        ));
        assert!(matches!(
            f.service
                .signup(signup_request("bob@example.com", "alice"), &home)
                .await,
            Err(ServiceError::DuplicateUsername)
        ));
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let f = fixture();
        f.service
            .signup(signup_request("alice@example.com", "alice"), &device("203.0.113.1"))
            .await
            .unwrap();

        let sent = wait_for_mail(&f.email, 1).await;
        assert_eq!(sent[0].0, "alice@example.com");
        let token = token_of(&sent[0].1);

        f.service.verify_email(&token).await.unwrap();
        assert!(matches!(
            f.service.verify_email(&token).await,
            Err(ServiceError::UnknownToken)
        ));
        let user = f
            .store
            .find_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.email_verified);
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let f = fixture();
        let home = device("203.0.113.1");
        f.service
            .signup(signup_request("alice@example.com", "alice"), &home)
            .await
            .unwrap();

        assert!(matches!(
            f.service.login(login_request("wrong-password"), &home).await,
            Err(ServiceError::LoginIncorrect)
        ));
        let mut unknown = login_request("password123");
        unknown.email = "nobody@example.com".to_string();
        assert!(matches!(
            f.service.login(unknown, &home).await,
            Err(ServiceError::LoginIncorrect)
        ));

        let session = f.service.login(login_request("password123"), &home).await.unwrap();
        assert_eq!(session.device_ip_address, "203.0.113.1");
        assert_eq!(session.device_user_agent, "test-agent");
    }

    #[tokio::test]
    async fn new_location_needs_email_confirmation() {
        let f = fixture();
        let home = device("203.0.113.1");
        let away = device("198.51.100.7");
        f.service
            .signup(signup_request("alice@example.com", "alice"), &home)
            .await
            .unwrap();
        let verify = token_of(&wait_for_mail(&f.email, 1).await[0].1);
        f.service.verify_email(&verify).await.unwrap();

        assert!(matches!(
            f.service.login(login_request("password123"), &away).await,
            Err(ServiceError::LoginEmailSent)
        ));
        let sent = wait_for_mail(&f.email, 2).await;
        match &sent[1].1 {
            Notification::VerifyLogin { location, .. } => assert_eq!(location, "Lisbon, PT"),
            other => panic!("unexpected notification {other:?}"),
        }

        f.service.verify_login(&token_of(&sent[1].1)).await.unwrap();
        f.service.login(login_request("password123"), &away).await.unwrap();
        assert!(matches!(
            f.service.login(login_request("password123"), &home).await,
            Err(ServiceError::LoginEmailSent)
        ));
    }

    #[tokio::test]
    async fn password_change_keeps_history_and_signs_out_others() {
        let f = fixture();
        let home = device("203.0.113.1");
        f.service
            .signup(signup_request("alice@example.com", "alice"), &home)
            .await
            .unwrap();
        let current = f.service.login(login_request("password123"), &home).await.unwrap();
        let other = f.service.login(login_request("password123"), &home).await.unwrap();
        let ctx = user_context(&current);

        assert!(matches!(
            f.service
                .change_password(&ctx, Password::new("nope"), Password::new("password456"))
                .await,
            Err(ServiceError::PasswordIncorrect)
        ));
        assert!(matches!(
            f.service
                .change_password(&ctx, Password::new("password123"), Password::new("password123"))
                .await,
            Err(ServiceError::PasswordAlreadyUsed)
        ));

        f.service
            .change_password(&ctx, Password::new("password123"), Password::new("password456"))
            .await
            .unwrap();

        let live: Vec<i64> = f
            .store
            .list_sessions(current.user_id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(live, vec![current.id]);
        assert!(!live.contains(&other.id));
    }

    #[tokio::test]
    async fn reset_token_consumed_once() {
        let f = fixture();
        f.service
            .signup(signup_request("alice@example.com", "alice"), &device("203.0.113.1"))
            .await
            .unwrap();
        f.service
            .request_password_reset("nobody@example.com")
            .await
            .unwrap();
        f.service
            .request_password_reset("alice@example.com")
            .await
            .unwrap();

        let sent = wait_for_mail(&f.email, 2).await;
        let token = token_of(&sent[1].1);
        f.service
            .confirm_password_reset(&token, Password::new("password456"))
            .await
            .unwrap();
        assert!(matches!(
            f.service
                .confirm_password_reset(&token, Password::new("password789"))
                .await,
            Err(ServiceError::UnknownToken)
        ));
    }

    #[tokio::test]
    async fn me_hides_email_without_scope() {
        let f = fixture();
        f.service
            .signup(signup_request("alice@example.com", "alice"), &device("203.0.113.1"))
            .await
            .unwrap();
        let user = f
            .store
            .find_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();

        let identify_only = SessionContext::for_connection(user.id, 1, 77, Scopes::IDENTIFY);
        let me = f.service.me(&identify_only).await.unwrap();
        assert_eq!(me.username, "alice");
        assert_eq!(me.email, None);

        let both = SessionContext::for_connection(user.id, 1, 77, Scopes::IDENTIFY | Scopes::EMAIL);
        assert_eq!(
            f.service.me(&both).await.unwrap().email.as_deref(),
            Some("alice@example.com")
        );

        let none = SessionContext::for_connection(user.id, 1, 77, Scopes::EMAIL);
        assert!(matches!(
            f.service.me(&none).await,
            Err(ServiceError::ScopeRequired)
        ));
    }

    #[tokio::test]
    async fn profile_edits_clear_and_reset_fields() {
        let f = fixture();
        let home = device("203.0.113.1");
        f.service
            .signup(signup_request("alice@example.com", "alice"), &home)
            .await
            .unwrap();
        let session = f.service.login(login_request("password123"), &home).await.unwrap();
        let ctx = user_context(&session);

        assert!(matches!(
            f.service
                .update_profile(&ctx, UpdateProfileRequest::default())
                .await,
            Err(ServiceError::EmptyBody)
        ));

        let edited = f
            .service
            .update_profile(
                &ctx,
                UpdateProfileRequest {
                    displayname: Some("Alice A.".to_string()),
                    subtitle: Some("she/her".to_string()),
                    accent_banner: Some(0x3498db),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.displayname, "Alice A.");
        assert_eq!(edited.subtitle.as_deref(), Some("she/her"));
        assert_eq!(edited.accent_banner, Some(0x3498db));

        let cleared = f
            .service
            .update_profile(
                &ctx,
                UpdateProfileRequest {
                    displayname: Some(String::new()),
                    subtitle: Some(String::new()),
                    accent_banner: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.displayname, "alice");
        assert_eq!(cleared.subtitle, None);
        assert_eq!(cleared.accent_banner, None);

        let public = f.service.public_profile(ctx.user_id).await.unwrap();
        assert_eq!(public.id, ctx.user_id.to_string());
        assert_eq!(public.displayname, "alice");
        assert!(matches!(
            f.service.public_profile(ctx.user_id + 1).await,
            Err(ServiceError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn email_change_notifies_both_addresses() {
        let f = fixture();
        let home = device("203.0.113.1");
        for (email, username) in [("alice@example.com", "alice"), ("bob@example.com", "bob")] {
            f.service
                .signup(signup_request(email, username), &home)
                .await
                .unwrap();
        }
        let verify = token_of(&wait_for_mail(&f.email, 2).await[0].1);
        f.service.verify_email(&verify).await.unwrap();

        let session = f.service.login(login_request("password123"), &home).await.unwrap();
        let mut ctx = user_context(&session);
        assert!(matches!(
            f.service.change_email(&ctx, "carol@example.com").await,
            Err(ServiceError::EscalationRequired)
        ));

        ctx.elevated = true;
        assert!(matches!(
            f.service.change_email(&ctx, "BOB@example.com").await,
            Err(ServiceError::DuplicateEmail)
        ));
        assert!(matches!(
            f.service.change_email(&ctx, "alice@example.com").await,
            Err(ServiceError::DuplicateEmail)
        ));

        f.service
            .change_email(&ctx, " Carol@Example.com ")
            .await
            .unwrap();
        let sent = wait_for_mail(&f.email, 4).await;
        assert_eq!(sent[2].0, "carol@example.com");
        assert!(matches!(sent[2].1, Notification::VerifyEmail { .. }));
        assert_eq!(sent[3].0, "alice@example.com");
        assert_eq!(sent[3].1.kind(), "email_modified");

        let user = f.store.find_user(ctx.user_id).await.unwrap().unwrap();
        assert_eq!(user.email_address, "carol@example.com");
        assert!(!user.email_verified);

        f.service.resend_verification(&ctx).await.unwrap();
        let resent = token_of(&wait_for_mail(&f.email, 5).await[4].1);
        f.service.verify_email(&resent).await.unwrap();
        assert!(matches!(
            f.service.resend_verification(&ctx).await,
            Err(ServiceError::EmailAlreadyVerified)
        ));
    }

    #[test]
    fn asset_paths_cover_profile_and_icons() {
        assert_eq!(
            asset_paths(5, &[9, 10]),
            vec!["avatars/5", "banners/5", "icons/9", "icons/10"]
        );
    }
}
