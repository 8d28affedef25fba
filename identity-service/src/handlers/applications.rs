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
            ApplicationCreatedResponse, ApplicationSecretResponse, CreateApplicationRequest,
            UpdateApplicationRequest,
        },
        ErrorResponse,
    },
    handlers::parse_id,
    middleware::Caller,
    models::ApplicationInfo,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Register an OAuth2 application
#[utoipa::path(
    post,
    path = "/users/@me/applications",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created; the secret is only shown here", body = ApplicationCreatedResponse),
        (status = 400, description = "Invalid redirect URI", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Applications"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn create_application(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    ValidatedJson(req): ValidatedJson<CreateApplicationRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !req.has_valid_redirects() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Redirect URIs must be absolute http(s) URLs"
        )));
    }
    let created = state.applications.create(&ctx, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Applications owned by the user
#[utoipa::path(
    get,
    path = "/users/@me/applications",
    responses(
        (status = 200, description = "Owned applications", body = [ApplicationInfo]),
        (status = 403, description = "Users only", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Applications"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn list_applications(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<Vec<ApplicationInfo>>, AppError> {
    Ok(Json(state.applications.list(&ctx).await?))
}

/// Edit an application's name, description or redirect URIs
#[utoipa::path(
    patch,
    path = "/users/@me/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    request_body = UpdateApplicationRequest,
    responses(
        (status = 200, description = "Updated application", body = ApplicationInfo),
        (status = 400, description = "Empty body or invalid redirect URI", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Applications"
)]
#[tracing::instrument(skip(state, ctx, req))]
pub async fn update_application(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateApplicationRequest>,
) -> Result<Json<ApplicationInfo>, AppError> {
    if !req.has_valid_redirects() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Redirect URIs must be absolute http(s) URLs"
        )));
    }
    let application_id = parse_id(&id, ServiceError::UnknownApplication)?;
    let updated = state
        .applications
        .update(&ctx, application_id, req)
        .await?;
    Ok(Json(updated))
}

/// Delete an application with its grants and connections
#[utoipa::path(
    delete,
    path = "/users/@me/applications/{id}",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 204, description = "Application deleted"),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Applications"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn delete_application(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let application_id = parse_id(&id, ServiceError::UnknownApplication)?;
    state.applications.delete(&ctx, application_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate an application's client secret
#[utoipa::path(
    post,
    path = "/users/@me/applications/{id}/reset",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "New secret", body = ApplicationSecretResponse),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Applications"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn reset_application_secret(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<ApplicationSecretResponse>, AppError> {
    let application_id = parse_id(&id, ServiceError::UnknownApplication)?;
    let secret = state
        .applications
        .reset_secret(&ctx, application_id)
        .await?;
    Ok(Json(ApplicationSecretResponse { secret }))
}
