//! Password, escalation, MFA and session management for the signed-in user.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        users::{
            ChangeEmailRequest, ChangePasswordRequest, EscalateRequest, MfaSetupResponse,
            NewRecoveryCodesResponse, PasscodeRequest, RecoveryCodesResponse, SessionsResponse,
        },
        ErrorResponse,
    },
    handlers::parse_id,
    middleware::Caller,
    services::ServiceError,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Change password; other sessions are signed out
#[utoipa::path(
    patch,
    path = "/users/@me/security/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Password already used", body = ErrorResponse),
        (status = 401, description = "Incorrect password", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn change_password(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .accounts
        .change_password(
            &ctx,
            Password::new(req.old_password),
            Password::new(req.new_password),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resend the verification email for an unverified address
#[utoipa::path(
    post,
    path = "/users/@me/security/email",
    responses(
        (status = 204, description = "Verification email queued"),
        (status = 400, description = "Email already verified", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.resend_verification(&ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the account's email address; it must be verified again
#[utoipa::path(
    patch,
    path = "/users/@me/security/email",
    request_body = ChangeEmailRequest,
    responses(
        (status = 204, description = "Email changed, verification email queued"),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn change_email(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<ChangeEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.change_email(&ctx, &req.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-verify identity to elevate the current session for ten minutes
#[utoipa::path(
    post,
    path = "/users/@me/security/escalate",
    request_body = EscalateRequest,
    responses(
        (status = 204, description = "Session elevated"),
        (status = 401, description = "Incorrect password or passcode", body = ErrorResponse),
        (status = 403, description = "Passcode required", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn escalate(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<EscalateRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .mfa
        .escalate(
            &ctx,
            req.password.map(Password::new),
            req.passcode.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start authenticator setup
#[utoipa::path(
    get,
    path = "/users/@me/security/mfa/setup",
    responses(
        (status = 200, description = "Pending secret and recovery codes", body = MfaSetupResponse),
        (status = 400, description = "MFA already set up", body = ErrorResponse),
        (status = 403, description = "Escalation required", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn begin_mfa_setup(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<MfaSetupResponse>, AppError> {
    Ok(Json(state.mfa.begin_setup(&ctx).await?))
}

/// Confirm authenticator setup with a current passcode
#[utoipa::path(
    post,
    path = "/users/@me/security/mfa/setup",
    request_body = PasscodeRequest,
    responses(
        (status = 204, description = "MFA enabled"),
        (status = 400, description = "MFA already set up", body = ErrorResponse),
        (status = 401, description = "Incorrect passcode", body = ErrorResponse),
        (status = 412, description = "Setup not started", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn confirm_mfa_setup(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<PasscodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.mfa.confirm_setup(&ctx, &req.passcode).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Disable MFA
#[utoipa::path(
    delete,
    path = "/users/@me/security/mfa/setup",
    responses(
        (status = 204, description = "MFA disabled"),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 412, description = "MFA is disabled", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn disable_mfa(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<impl IntoResponse, AppError> {
    state.mfa.disable(&ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recovery codes and whether each has been used
#[utoipa::path(
    get,
    path = "/users/@me/security/mfa/codes",
    responses(
        (status = 200, description = "Recovery codes", body = RecoveryCodesResponse),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 412, description = "MFA is disabled", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn list_recovery_codes(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<RecoveryCodesResponse>, AppError> {
    let recovery_codes = state.mfa.recovery_codes(&ctx).await?;
    Ok(Json(RecoveryCodesResponse { recovery_codes }))
}

/// Replace every recovery code
#[utoipa::path(
    delete,
    path = "/users/@me/security/mfa/codes",
    responses(
        (status = 200, description = "New recovery codes", body = NewRecoveryCodesResponse),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 412, description = "MFA is disabled", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<NewRecoveryCodesResponse>, AppError> {
    let recovery_codes = state.mfa.regenerate_codes(&ctx).await?;
    Ok(Json(NewRecoveryCodesResponse { recovery_codes }))
}

/// Live sessions with their approximate location
#[utoipa::path(
    get,
    path = "/users/@me/security/sessions",
    responses(
        (status = 200, description = "Sessions", body = SessionsResponse),
        (status = 403, description = "Users only", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn list_sessions(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<SessionsResponse>, AppError> {
    Ok(Json(state.accounts.list_sessions(&ctx).await?))
}

/// Revoke one session
#[utoipa::path(
    delete,
    path = "/users/@me/security/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Security"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn revoke_session(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session_id = parse_id(&id, ServiceError::UnknownSession)?;
    state.accounts.revoke_session(&ctx, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
