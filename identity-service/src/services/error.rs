use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use crate::services::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Empty form body")]
    EmptyBody,

    #[error("Unknown user")]
    UnknownUser,

    #[error("Unknown token")]
    UnknownToken,

    #[error("Unknown session")]
    UnknownSession,

    #[error("Unknown application")]
    UnknownApplication,

    #[error("Unknown connection")]
    UnknownConnection,

    #[error("Access revoked")]
    AccessRevoked,

    #[error("Access expired")]
    AccessExpired,

    #[error("Incorrect email or password")]
    LoginIncorrect,

    #[error("Password reset required")]
    PasswordResetRequired,

    #[error("Password already used")]
    PasswordAlreadyUsed,

    #[error("Username already in use")]
    DuplicateUsername,

    #[error("Email address already in use")]
    DuplicateEmail,

    #[error("Email address already verified")]
    EmailAlreadyVerified,

    #[error("Login from a new location, confirmation email sent")]
    LoginEmailSent,

    #[error("Authenticator passcode required")]
    PasscodeRequired,

    #[error("Authenticator passcode incorrect")]
    PasscodeIncorrect,

    #[error("Recovery code used")]
    RecoveryCodeUsed,

    #[error("Recovery code incorrect")]
    RecoveryCodeIncorrect,

    #[error("Escalation required")]
    EscalationRequired,

    #[error("Incorrect password")]
    PasswordIncorrect,

    #[error("MFA is disabled")]
    MfaDisabled,

    #[error("MFA is already set up")]
    MfaAlreadySetup,

    #[error("MFA setup not started")]
    MfaNotInitialized,

    #[error("Additional scope required")]
    ScopeRequired,

    #[error("Users only")]
    UsersOnly,

    #[error("Invalid redirect_uri")]
    InvalidRedirectUri,

    #[error("Invalid response_type")]
    InvalidResponseType,

    #[error("Invalid grant_type")]
    InvalidGrantType,

    #[error("Invalid code")]
    InvalidCode,

    #[error("Invalid refresh_token")]
    InvalidRefreshToken,

    #[error("Invalid scope")]
    InvalidScope,
}

impl ServiceError {
    /// Status, stable client code and message for every client-visible outcome.
    fn rejection(&self) -> Option<(StatusCode, u32, &'static str)> {
        use ServiceError::*;
        let rejection = match self {
            Store(_) | Internal(_) => return None,
            Unauthenticated => (StatusCode::UNAUTHORIZED, 0, "Unauthorized"),
            EmptyBody => (StatusCode::BAD_REQUEST, 0, "Empty Form Body"),
            UnknownUser => (StatusCode::NOT_FOUND, 1020, "Unknown User"),
            UnknownToken => (StatusCode::NOT_FOUND, 1030, "Unknown Token"),
            UnknownSession => (StatusCode::NOT_FOUND, 1040, "Unknown Session"),
            UnknownApplication => (StatusCode::NOT_FOUND, 1050, "Unknown Application"),
            UnknownConnection => (StatusCode::NOT_FOUND, 1060, "Unknown Connection"),
            AccessRevoked => (StatusCode::UNAUTHORIZED, 3010, "Access Revoked"),
            AccessExpired => (StatusCode::UNAUTHORIZED, 3020, "Access Expired"),
            LoginIncorrect => (StatusCode::UNAUTHORIZED, 4010, "Incorrect Email or Password"),
            PasswordResetRequired => (
                StatusCode::UNAUTHORIZED,
                4030,
                "Account Locked. Please reset your password",
            ),
            PasswordAlreadyUsed => (StatusCode::BAD_REQUEST, 4040, "Password Already Used"),
            DuplicateUsername => (StatusCode::CONFLICT, 4050, "Username is already in use"),
            DuplicateEmail => (StatusCode::CONFLICT, 4060, "Email Address is already in use"),
            LoginEmailSent => (StatusCode::FORBIDDEN, 5010, "Email Sent"),
            EmailAlreadyVerified => (
                StatusCode::BAD_REQUEST,
                5020,
                "Email Address already Verified",
            ),
            PasscodeRequired => (
                StatusCode::FORBIDDEN,
                5030,
                "Authenticator Passcode Required",
            ),
            PasscodeIncorrect => (
                StatusCode::UNAUTHORIZED,
                5040,
                "Authenticator Passcode Incorrect",
            ),
            RecoveryCodeUsed => (StatusCode::UNAUTHORIZED, 5050, "Recovery Code Used"),
            RecoveryCodeIncorrect => (StatusCode::FORBIDDEN, 5060, "Recovery Code Incorrect"),
            EscalationRequired => (StatusCode::FORBIDDEN, 5070, "Escalation Required"),
            PasswordIncorrect => (StatusCode::UNAUTHORIZED, 5080, "Incorrect Password"),
            MfaDisabled => (StatusCode::PRECONDITION_FAILED, 5090, "MFA is Disabled"),
            MfaAlreadySetup => (StatusCode::BAD_REQUEST, 5100, "MFA is Already Setup"),
            MfaNotInitialized => (StatusCode::PRECONDITION_FAILED, 5110, "MFA Setup not Started"),
            ScopeRequired => (
                StatusCode::FORBIDDEN,
                6010,
                "Endpoint requires an Additional Scope",
            ),
            UsersOnly => (StatusCode::FORBIDDEN, 6020, "Endpoint restricted to Users Only"),
            InvalidRedirectUri => (StatusCode::BAD_REQUEST, 6030, "Invalid 'redirect_uri'"),
            InvalidResponseType => (StatusCode::BAD_REQUEST, 6040, "Invalid 'response_type'"),
            InvalidGrantType => (StatusCode::BAD_REQUEST, 6050, "Invalid 'grant_type'"),
            InvalidCode => (StatusCode::BAD_REQUEST, 6060, "Invalid 'code'"),
            InvalidRefreshToken => (StatusCode::BAD_REQUEST, 6080, "Invalid 'refresh_token'"),
            InvalidScope => (StatusCode::BAD_REQUEST, 6090, "Invalid 'scope'"),
        };
        Some(rejection)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        if let Some((status, code, message)) = err.rejection() {
            return AppError::Rejected {
                status,
                code,
                message,
            };
        }

        match err {
            ServiceError::Store(StoreError::Timeout) => {
                AppError::DatabaseError(anyhow::anyhow!("Store operation timed out"))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            other => AppError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}
