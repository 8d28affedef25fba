use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::{
    dtos::{
        auth::{
            LoginRequest, PasswordResetConfirm, PasswordResetRequest, SignupRequest, TokenRequest,
        },
        ErrorResponse,
    },
    handlers::{cleared_cookie, device, login_cookie},
    middleware::Caller,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Create an account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 204, description = "Account created, verification email queued"),
        (status = 400, description = "Invalid username", body = ErrorResponse),
        (status = 409, description = "Email or username already in use", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, headers, connect_info, req))]
pub async fn signup(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !req.has_valid_username() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Username may only contain letters, digits and underscores"
        )));
    }
    let device = device(&state.http, &headers, connect_info);
    state.accounts.signup(req, &device).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirm an email address
#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = TokenRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.verify_email(&req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Approve a login from a new location
#[utoipa::path(
    post,
    path = "/auth/verify-login",
    request_body = TokenRequest,
    responses(
        (status = 204, description = "Location approved"),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn verify_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.verify_login(&req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Log in with email, password and, once enabled, an MFA passcode
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 204, description = "Logged in, session cookie set"),
        (status = 401, description = "Incorrect credentials or passcode", body = ErrorResponse),
        (status = 403, description = "Passcode required or new location email sent", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, jar, headers, connect_info, req))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device = device(&state.http, &headers, connect_info);
    let session = state.accounts.login(req, &device).await?;
    Ok((
        jar.add(login_cookie(&state.http, session.token)),
        StatusCode::NO_CONTENT,
    ))
}

/// Revoke the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out, cookie cleared"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, jar, ctx))]
pub async fn logout(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.logout(&ctx).await?;
    Ok((jar.add(cleared_cookie(&state.http)), StatusCode::NO_CONTENT))
}

/// Request a password reset email
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = PasswordResetRequest,
    responses(
        (status = 204, description = "Request received"),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.request_password_reset(&req.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set a new password with an emailed reset token
#[utoipa::path(
    patch,
    path = "/auth/reset-password",
    request_body = PasswordResetConfirm,
    responses(
        (status = 204, description = "Password changed, all sessions revoked"),
        (status = 400, description = "Password already used", body = ErrorResponse),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .accounts
        .confirm_password_reset(&req.token, Password::new(req.password))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
