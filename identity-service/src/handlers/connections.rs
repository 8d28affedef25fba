use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::ErrorResponse,
    handlers::parse_id,
    middleware::Caller,
    models::ConnectionInfo,
    services::ServiceError,
    AppState,
};

/// Applications the user has authorized
#[utoipa::path(
    get,
    path = "/users/@me/connections",
    responses(
        (status = 200, description = "Live connections", body = [ConnectionInfo]),
        (status = 403, description = "Users only", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Connections"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn list_connections(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> Result<Json<Vec<ConnectionInfo>>, AppError> {
    Ok(Json(state.accounts.list_connections(&ctx).await?))
}

/// Withdraw an application's access
#[utoipa::path(
    delete,
    path = "/users/@me/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 204, description = "Connection revoked"),
        (status = 403, description = "Escalation required", body = ErrorResponse),
        (status = 404, description = "Unknown connection", body = ErrorResponse)
    ),
    security(("session_cookie" = []), ("user_token" = [])),
    tag = "Connections"
)]
#[tracing::instrument(skip(state, ctx))]
pub async fn revoke_connection(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let connection_id = parse_id(&id, ServiceError::UnknownConnection)?;
    state.accounts.revoke_connection(&ctx, connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
