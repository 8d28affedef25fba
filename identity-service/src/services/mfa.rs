//! TOTP authenticator setup, recovery codes and session elevation.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::dtos::users::{MfaSetupResponse, RecoveryCode};
use crate::models::{SessionContext, User, ELEVATION_LIFETIME_SECONDS};
use crate::services::clock::Clock;
use crate::services::store::IdentityStore;
use crate::services::ServiceError;
use crate::utils::{verify_password, Password};

pub const RECOVERY_CODE_COUNT: usize = 8;
const RECOVERY_CODE_BYTES: usize = 4;
const SECRET_BYTES: usize = 20;
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Accept the previous and next step as well.
const TOTP_SKEW: u8 = 1;

/// Random 160-bit secret, base32 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::Raw(bytes.to_vec()).to_encoded().to_string()
}

pub fn generate_recovery_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            let mut bytes = [0u8; RECOVERY_CODE_BYTES];
            rng.fill_bytes(&mut bytes);
            hex::encode_upper(bytes)
        })
        .collect()
}

/// Provisioning URI understood by authenticator apps.
pub fn otpauth_uri(issuer: &str, account: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{}?period={}&digits={}&algorithm=SHA1&secret={}&issuer={}",
        urlencoding::encode(account),
        TOTP_STEP_SECONDS,
        TOTP_DIGITS,
        urlencoding::encode(secret),
        urlencoding::encode(issuer),
    )
}

fn totp(secret: &str) -> Result<TOTP, anyhow::Error> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| anyhow::anyhow!("Invalid TOTP secret: {:?}", e))?;
    TOTP::new(Algorithm::SHA1, TOTP_DIGITS, TOTP_SKEW, TOTP_STEP_SECONDS, bytes)
        .map_err(|e| anyhow::anyhow!("Invalid TOTP parameters: {}", e))
}

fn unix_seconds(at: DateTime<Utc>) -> u64 {
    at.timestamp().max(0) as u64
}

/// Code for the step containing `at`.
pub fn totp_code(secret: &str, at: DateTime<Utc>) -> Result<String, anyhow::Error> {
    Ok(totp(secret)?.generate(unix_seconds(at)))
}

/// True if `code` matches the current, previous or next step.
pub fn verify_totp(secret: &str, code: &str, at: DateTime<Utc>) -> Result<bool, anyhow::Error> {
    Ok(totp(secret)?.check(code, unix_seconds(at)))
}

/// Shape of a submitted passcode.
#[derive(Debug, PartialEq, Eq)]
enum Passcode {
    Totp(String),
    Recovery(String),
}

impl Passcode {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.len() == TOTP_DIGITS && input.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Passcode::Totp(input.to_string()));
        }
        if input.len() == RECOVERY_CODE_BYTES * 2 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Some(Passcode::Recovery(input.to_ascii_uppercase()));
        }
        None
    }
}

#[derive(Clone)]
pub struct MfaService {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    issuer: String,
}

impl MfaService {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, issuer: String) -> Self {
        Self {
            store,
            clock,
            issuer,
        }
    }

    async fn load_user(&self, user_id: i64) -> Result<User, ServiceError> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)
    }

    /// Start (or restart) setup. MFA stays disabled until confirmed.
    pub async fn begin_setup(
        &self,
        ctx: &SessionContext,
    ) -> Result<MfaSetupResponse, ServiceError> {
        ctx.require_elevated()?;
        let user = self.load_user(ctx.user_id).await?;
        if user.mfa_enabled {
            return Err(ServiceError::MfaAlreadySetup);
        }
        let profile = self
            .store
            .find_profile(ctx.user_id)
            .await?
            .ok_or(ServiceError::UnknownUser)?;

        let secret = generate_secret();
        let recovery_codes = generate_recovery_codes();
        if !self
            .store
            .begin_mfa_setup(user.id, &secret, &recovery_codes)
            .await?
        {
            return Err(ServiceError::MfaAlreadySetup);
        }

        let account = format!("{} ({})", profile.username, user.email_address);
        tracing::info!(user_id = user.id, "MFA setup started");
        Ok(MfaSetupResponse {
            uri: otpauth_uri(&self.issuer, &account, &secret),
            secret,
            recovery_codes,
        })
    }

    pub async fn confirm_setup(
        &self,
        ctx: &SessionContext,
        passcode: &str,
    ) -> Result<(), ServiceError> {
        ctx.require_user()?;
        let user = self.load_user(ctx.user_id).await?;
        if user.mfa_enabled {
            return Err(ServiceError::MfaAlreadySetup);
        }
        let secret = user
            .mfa_secret
            .as_deref()
            .ok_or(ServiceError::MfaNotInitialized)?;

        if !verify_totp(secret, passcode.trim(), self.clock.now())? {
            return Err(ServiceError::PasscodeIncorrect);
        }
        if !self.store.enable_mfa(user.id).await? {
            return Err(ServiceError::MfaAlreadySetup);
        }

        tracing::info!(user_id = user.id, "MFA enabled");
        Ok(())
    }

    pub async fn disable(&self, ctx: &SessionContext) -> Result<(), ServiceError> {
        ctx.require_elevated()?;
        if !self.store.disable_mfa(ctx.user_id).await? {
            return Err(ServiceError::MfaDisabled);
        }
        tracing::info!(user_id = ctx.user_id, "MFA disabled");
        Ok(())
    }

    pub async fn recovery_codes(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<RecoveryCode>, ServiceError> {
        ctx.require_elevated()?;
        let user = self.load_user(ctx.user_id).await?;
        if !user.mfa_enabled {
            return Err(ServiceError::MfaDisabled);
        }
        Ok(user
            .mfa_codes
            .iter()
            .enumerate()
            .map(|(index, code)| RecoveryCode {
                code: code.clone(),
                used: user.recovery_code_used(index),
            })
            .collect())
    }

    /// Replace every recovery code and clear the used markers.
    pub async fn regenerate_codes(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<String>, ServiceError> {
        ctx.require_elevated()?;
        let codes = generate_recovery_codes();
        if !self.store.replace_recovery_codes(ctx.user_id, &codes).await? {
            return Err(ServiceError::MfaDisabled);
        }
        tracing::info!(user_id = ctx.user_id, "Recovery codes regenerated");
        Ok(codes)
    }

    /// Check a TOTP passcode or consume a recovery code for a user with MFA enabled.
    pub async fn verify_passcode(
        &self,
        user: &User,
        passcode: Option<&str>,
    ) -> Result<(), ServiceError> {
        let passcode = passcode
            .filter(|p| !p.trim().is_empty())
            .ok_or(ServiceError::PasscodeRequired)?;
        let secret = user
            .mfa_secret
            .as_deref()
            .ok_or(ServiceError::MfaNotInitialized)?;

        match Passcode::parse(passcode) {
            Some(Passcode::Totp(code)) => {
                if verify_totp(secret, &code, self.clock.now())? {
                    Ok(())
                } else {
                    Err(ServiceError::PasscodeIncorrect)
                }
            }
            Some(Passcode::Recovery(code)) => {
                let index = user
                    .mfa_codes
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(&code))
                    .ok_or(ServiceError::RecoveryCodeIncorrect)?;
                if user.recovery_code_used(index) {
                    return Err(ServiceError::RecoveryCodeUsed);
                }
                // A concurrent request may have consumed it since `user` was read.
                if !self.store.mark_recovery_code_used(user.id, index).await? {
                    return Err(ServiceError::RecoveryCodeUsed);
                }
                tracing::info!(user_id = user.id, index, "Recovery code consumed");
                Ok(())
            }
            None => Err(ServiceError::PasscodeIncorrect),
        }
    }

    /// Re-verify the caller and mark the current session elevated.
    pub async fn escalate(
        &self,
        ctx: &SessionContext,
        password: Option<Password>,
        passcode: Option<&str>,
    ) -> Result<DateTime<Utc>, ServiceError> {
        let session_id = ctx.require_user()?;
        let user = self.load_user(ctx.user_id).await?;

        if user.mfa_enabled {
            self.verify_passcode(&user, passcode).await?;
        } else {
            let password = password.ok_or(ServiceError::PasswordIncorrect)?;
            let hash = user
                .password_hash
                .as_deref()
                .ok_or(ServiceError::PasswordResetRequired)?;
            if !verify_password(&password, hash)? {
                return Err(ServiceError::PasswordIncorrect);
            }
        }

        let until = self.clock.now() + Duration::seconds(ELEVATION_LIFETIME_SECONDS);
        if !self.store.elevate_session(session_id, until).await? {
            return Err(ServiceError::UnknownSession);
        }
        tracing::info!(user_id = user.id, session_id, "Session elevated");
        Ok(until)
    }
}
