use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{ApplicationInfo, Profile, SessionInfo};

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    #[schema(example = "1187026352443101184")]
    pub id: String,
    pub created: DateTime<Utc>,
    #[schema(example = "alice_01")]
    pub username: String,
    #[schema(example = "Alice")]
    pub displayname: String,
    /// Only present for first-party callers and applications holding the `email` scope.
    #[schema(example = "user@example.com")]
    pub email: Option<String>,
    pub verified: bool,
    pub mfa_enabled: bool,
}

/// Profile anyone may look up by id.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicProfileResponse {
    #[schema(example = "1187026352443101184")]
    pub id: String,
    pub created: DateTime<Utc>,
    #[schema(example = "alice_01")]
    pub username: String,
    #[schema(example = "Alice")]
    pub displayname: String,
    pub subtitle: Option<String>,
    pub biography: Option<String>,
    #[schema(example = 3447003)]
    pub accent_banner: Option<i32>,
    pub accent_border: Option<i32>,
    pub accent_background: Option<i32>,
}

impl From<Profile> for PublicProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id.to_string(),
            created: profile.created,
            username: profile.username,
            displayname: profile.displayname,
            subtitle: profile.subtitle,
            biography: profile.biography,
            accent_banner: profile.accent_banner,
            accent_border: profile.accent_border,
            accent_background: profile.accent_background,
        }
    }
}

/// Partial profile edit. Accents are RGB values. Empty strings and a zero accent clear
/// the field; an empty display name falls back to the username.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 32, message = "Display name must be at most 32 characters"))]
    pub displayname: Option<String>,

    #[validate(length(max = 32, message = "Subtitle must be at most 32 characters"))]
    pub subtitle: Option<String>,

    #[validate(length(max = 320, message = "Biography must be at most 320 characters"))]
    pub biography: Option<String>,

    #[validate(range(min = 0, max = 16_777_215, message = "Invalid accent colour"))]
    pub accent_banner: Option<i32>,

    #[validate(range(min = 0, max = 16_777_215, message = "Invalid accent colour"))]
    pub accent_border: Option<i32>,

    #[validate(range(min = 0, max = 16_777_215, message = "Invalid accent colour"))]
    pub accent_background: Option<i32>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.displayname.is_none()
            && self.subtitle.is_none()
            && self.biography.is_none()
            && self.accent_banner.is_none()
            && self.accent_border.is_none()
            && self.accent_background.is_none()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangeEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "new@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,

    #[validate(length(min = 8, max = 64, message = "Password must be 8 to 64 characters"))]
    #[schema(min_length = 8, max_length = 64)]
    pub new_password: String,
}

/// Re-verification for elevation: a passcode once MFA is enabled, the password otherwise.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EscalateRequest {
    pub password: Option<String>,
    #[schema(example = "123456")]
    pub passcode: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasscodeRequest {
    #[validate(length(min = 1, message = "Passcode is required"))]
    #[schema(example = "123456")]
    pub passcode: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaSetupResponse {
    #[schema(example = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP")]
    pub secret: String,
    pub uri: String,
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct RecoveryCode {
    #[schema(example = "9F3A0C12")]
    pub code: String,
    pub used: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<RecoveryCode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NewRecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// Id of the session making the request.
    pub current: String,
    pub sessions: Vec<SessionInfo>,
}

/// Absolute http(s) URIs of at most 512 bytes.
fn valid_redirects(redirects: &[String]) -> bool {
    redirects.iter().all(|uri| {
        (uri.starts_with("https://") || uri.starts_with("http://")) && uri.len() <= 512
    })
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 32, message = "Name must be 1 to 32 characters"))]
    #[schema(example = "My App")]
    pub name: String,

    #[validate(length(max = 320, message = "Description must be at most 320 characters"))]
    #[serde(default)]
    pub description: Option<String>,

    #[validate(length(max = 10, message = "At most 10 redirect URIs"))]
    #[schema(example = json!(["https://app.example.com/callback"]))]
    pub redirects: Vec<String>,
}

impl CreateApplicationRequest {
    pub fn has_valid_redirects(&self) -> bool {
        valid_redirects(&self.redirects)
    }
}

/// Partial application edit; an empty description clears it.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateApplicationRequest {
    #[validate(length(min = 1, max = 32, message = "Name must be 1 to 32 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 320, message = "Description must be at most 320 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 10, message = "At most 10 redirect URIs"))]
    pub redirects: Option<Vec<String>>,
}

impl UpdateApplicationRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.redirects.is_none()
    }

    pub fn has_valid_redirects(&self) -> bool {
        self.redirects.as_deref().map_or(true, valid_redirects)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationCreatedResponse {
    #[serde(flatten)]
    pub application: ApplicationInfo,
    /// Shown once; only a reset reveals a new one.
    pub secret: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationSecretResponse {
    pub secret: String,
}
