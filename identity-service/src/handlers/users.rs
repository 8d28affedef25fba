use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        users::{MeResponse, PublicProfileResponse, UpdateProfileRequest},
        ErrorResponse,
    },
    handlers::{cleared_cookie, parse_id},
    middleware::Caller,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Current user. Applications need the `identify` scope; `email` reveals the address.
#[utoipa::path(
    get,
    path = "/users/@me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Missing scope", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = []), ("bearer_auth" = [])),
    tag = "User"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn get_me(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<MeResponse>, AppError> {
    Ok(Json(state.accounts.me(&ctx).await?))
}

/// Edit the caller's public profile
#[utoipa::path(
    patch,
    path = "/users/@me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = PublicProfileResponse),
        (status = 400, description = "Empty body", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "User"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn update_me(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<PublicProfileResponse>, AppError> {
    Ok(Json(state.accounts.update_profile(&ctx, req).await?))
}

/// Public profile of any user
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfileResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse)
    ),
    tag = "User"
)]
#[tracing::instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfileResponse>, AppError> {
    let user_id = parse_id(&id, ServiceError::UnknownUser)?;
    Ok(Json(state.accounts.public_profile(user_id).await?))
}

/// Delete the account and everything it owns
#[utoipa::path(
    delete,
    path = "/users/@me",
    responses(
        (status = 204, description = "Account deleted, cookie cleared"),
        (status = 403, description = "Users only or escalation required", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "User"
)]
#[tracing::instrument(skip(state, ctx, jar))]
pub async fn delete_me(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.delete_account(&ctx).await?;
    Ok((jar.add(cleared_cookie(&state.http)), StatusCode::NO_CONTENT))
}
