use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;
use tracing::Span;

use crate::models::SessionContext;
use crate::services::Credential;
use crate::AppState;

/// Resolve the caller and attach its [`SessionContext`] to the request.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = Credential::from_request(&state.http.cookie_name, &jar, req.headers());
    let ctx = state.resolver.resolve(credential).await?;

    Span::current().record("user_id", ctx.user_id);
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Extractor for the context inserted by [`session_middleware`].
pub struct Caller(pub SessionContext);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<SessionContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Session context missing. Is session_middleware applied?"
            ))
        })?;
        Ok(Caller(ctx.clone()))
    }
}
