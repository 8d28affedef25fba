//! OAuth2 authorization-code endpoints.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        oauth2::{AuthorizeParams, ConsentResponse, RevokeForm, TokenForm, TokenResponse},
        ErrorResponse,
    },
    middleware::Caller,
    services::ClientCredentials,
    AppState,
};

fn client_credentials(
    basic: Option<TypedHeader<Authorization<Basic>>>,
) -> Option<ClientCredentials> {
    basic.map(|TypedHeader(Authorization(basic))| ClientCredentials {
        client_id: basic.username().to_string(),
        client_secret: basic.password().to_string(),
    })
}

/// Describe what an application is asking for, without issuing anything
#[utoipa::path(
    get,
    path = "/oauth2/authorize",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Consent details", body = ConsentResponse),
        (status = 400, description = "Invalid response_type, scope or redirect_uri", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "OAuth2"
)]
#[tracing::instrument(skip(state, ctx, params), fields(client_id = %params.client_id))]
pub async fn consent(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<ConsentResponse>, AppError> {
    Ok(Json(state.oauth2.consent(&ctx, &params).await?))
}

/// Approve the request: issue a grant and redirect back with its code
#[utoipa::path(
    post,
    path = "/oauth2/authorize",
    params(AuthorizeParams),
    responses(
        (status = 302, description = "Redirect to redirect_uri with code and state"),
        (status = 400, description = "Invalid response_type, scope or redirect_uri", body = ErrorResponse),
        (status = 403, description = "Users only", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "OAuth2"
)]
#[tracing::instrument(skip(state, ctx, params), fields(client_id = %params.client_id))]
pub async fn authorize(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(params): Query<AuthorizeParams>,
) -> Result<impl IntoResponse, AppError> {
    let location = state.oauth2.authorize(&ctx, &params).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]))
}

/// Exchange an authorization code or refresh token
#[utoipa::path(
    post,
    path = "/oauth2/token",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid grant_type, code, redirect_uri or refresh_token", body = ErrorResponse),
        (status = 401, description = "Client authentication failed or access revoked", body = ErrorResponse),
        (status = 404, description = "Unknown application", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    security(("client_basic" = [])),
    tag = "OAuth2"
)]
#[tracing::instrument(skip(state, basic, form), fields(grant_type = %form.grant_type))]
pub async fn token(
    State(state): State<AppState>,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let tokens = state
        .oauth2
        .token(client_credentials(basic), &form)
        .await?;
    Ok(Json(tokens))
}

/// Revoke a connection by its access or refresh token
#[utoipa::path(
    post,
    path = "/oauth2/token/revoke",
    request_body(content = RevokeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 204, description = "Connection revoked"),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 404, description = "Unknown application or connection", body = ErrorResponse)
    ),
    security(("client_basic" = [])),
    tag = "OAuth2"
)]
#[tracing::instrument(skip(state, basic, form))]
pub async fn revoke(
    State(state): State<AppState>,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    Form(form): Form<RevokeForm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .oauth2
        .revoke(client_credentials(basic), &form.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
