pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::HttpConfig;
use crate::middleware::{rate_limit_middleware, session_middleware, RateLimitClass, RouteLimiter};
use crate::services::{
    AccountService, ApplicationService, BackgroundQueue, Clock, EmailProvider,
    GeolocationProvider, IdentityStore, MfaService, Notifier, OAuth2Service, RateLimitStore,
    SessionResolver, SnowflakeGenerator, StorageProvider,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::signup,
        handlers::auth::verify_email,
        handlers::auth::verify_login,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::request_password_reset,
        handlers::auth::confirm_password_reset,
        handlers::users::get_me,
        handlers::users::update_me,
        handlers::users::get_user,
        handlers::users::delete_me,
        handlers::security::change_password,
        handlers::security::resend_verification,
        handlers::security::change_email,
        handlers::security::escalate,
        handlers::security::begin_mfa_setup,
        handlers::security::confirm_mfa_setup,
        handlers::security::disable_mfa,
        handlers::security::list_recovery_codes,
        handlers::security::regenerate_recovery_codes,
        handlers::security::list_sessions,
        handlers::security::revoke_session,
        handlers::connections::list_connections,
        handlers::connections::revoke_connection,
        handlers::applications::create_application,
        handlers::applications::list_applications,
        handlers::applications::update_application,
        handlers::applications::delete_application,
        handlers::applications::reset_application_secret,
        handlers::oauth2::consent,
        handlers::oauth2::authorize,
        handlers::oauth2::token,
        handlers::oauth2::revoke,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::SignupRequest,
            dtos::auth::TokenRequest,
            dtos::auth::LoginRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetConfirm,
            dtos::users::MeResponse,
            dtos::users::PublicProfileResponse,
            dtos::users::UpdateProfileRequest,
            dtos::users::ChangeEmailRequest,
            dtos::users::ChangePasswordRequest,
            dtos::users::EscalateRequest,
            dtos::users::PasscodeRequest,
            dtos::users::MfaSetupResponse,
            dtos::users::RecoveryCode,
            dtos::users::RecoveryCodesResponse,
            dtos::users::NewRecoveryCodesResponse,
            dtos::users::SessionsResponse,
            dtos::users::CreateApplicationRequest,
            dtos::users::UpdateApplicationRequest,
            dtos::users::ApplicationCreatedResponse,
            dtos::users::ApplicationSecretResponse,
            dtos::oauth2::AuthorizeParams,
            dtos::oauth2::ConsentApplication,
            dtos::oauth2::ConsentResponse,
            dtos::oauth2::TokenForm,
            dtos::oauth2::TokenResponse,
            dtos::oauth2::RevokeForm,
            models::SessionInfo,
            models::ApplicationInfo,
            models::ConnectionInfo,
            models::connection::ConnectedApplication,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Signup, login and account recovery"),
        (name = "User", description = "The caller's own account"),
        (name = "Security", description = "Password, elevation, MFA and sessions"),
        (name = "Connections", description = "Third-party applications the user has authorized"),
        (name = "Applications", description = "OAuth2 applications owned by the user"),
        (name = "OAuth2", description = "Authorization-code and refresh-token exchange"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session"))),
            );
            components.add_security_scheme(
                "user_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "`User <session token>`",
                ))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("OAuth2 access token"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "client_basic",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

/// Everything the services are built from. Shared by `main` and the router tests.
pub struct Collaborators {
    pub store: Arc<dyn IdentityStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<SnowflakeGenerator>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub email: Arc<dyn EmailProvider>,
    pub storage: Arc<dyn StorageProvider>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub background: BackgroundQueue,
    pub totp_issuer: String,
}

#[derive(Clone)]
pub struct AppState {
    pub http: Arc<HttpConfig>,
    pub store: Arc<dyn IdentityStore>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub resolver: SessionResolver,
    pub accounts: AccountService,
    pub applications: ApplicationService,
    pub mfa: MfaService,
    pub oauth2: OAuth2Service,
}

impl AppState {
    pub fn new(http: HttpConfig, deps: Collaborators) -> Self {
        let Collaborators {
            store,
            clock,
            ids,
            rate_limiter,
            email,
            storage,
            geolocation,
            background,
            totp_issuer,
        } = deps;

        let notifier = Notifier::new(email, storage, background);
        let mfa = MfaService::new(store.clone(), clock.clone(), totp_issuer);

        Self {
            http: Arc::new(http),
            resolver: SessionResolver::new(store.clone(), clock.clone()),
            accounts: AccountService::new(
                store.clone(),
                clock.clone(),
                ids.clone(),
                geolocation,
                notifier.clone(),
                mfa.clone(),
            ),
            applications: ApplicationService::new(
                store.clone(),
                clock.clone(),
                ids.clone(),
                notifier,
            ),
            oauth2: OAuth2Service::new(store.clone(), clock, ids),
            mfa,
            store,
            rate_limiter,
        }
    }

    fn limiter(&self, class: RateLimitClass) -> RouteLimiter {
        RouteLimiter {
            store: self.rate_limiter.clone(),
            client_ip: Arc::new(self.http.client_ip.clone()),
            class,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            // Credentialed CORS cannot use a wildcard
            Ok(_) if o == "*" => {
                tracing::warn!("Ignoring wildcard CORS origin");
                None
            }
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Unauthenticated account routes share the login bucket
    let login_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/verify-email", post(handlers::auth::verify_email))
        .route("/auth/verify-login", post(handlers::auth::verify_login))
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/reset-password",
            post(handlers::auth::request_password_reset)
                .patch(handlers::auth::confirm_password_reset),
        )
        .layer(from_fn_with_state(
            state.limiter(RateLimitClass::Login),
            rate_limit_middleware,
        ));

    // Client-authenticated token endpoints
    let oauth2_routes = Router::new()
        .route("/oauth2/token", post(handlers::oauth2::token))
        .route("/oauth2/token/revoke", post(handlers::oauth2::revoke))
        .layer(from_fn_with_state(
            state.limiter(RateLimitClass::OAuth2),
            rate_limit_middleware,
        ));

    // Public profiles need no session but share the client buckets
    let public_routes = Router::new()
        .route("/users/:id", get(handlers::users::get_user))
        .layer(from_fn_with_state(
            state.limiter(RateLimitClass::Client),
            rate_limit_middleware,
        ));

    // Everything a resolved session or connection may call
    let client_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/users/@me",
            get(handlers::users::get_me)
                .patch(handlers::users::update_me)
                .delete(handlers::users::delete_me),
        )
        .route(
            "/users/@me/security/password",
            patch(handlers::security::change_password),
        )
        .route(
            "/users/@me/security/email",
            post(handlers::security::resend_verification).patch(handlers::security::change_email),
        )
        .route(
            "/users/@me/security/escalate",
            post(handlers::security::escalate),
        )
        .route(
            "/users/@me/security/mfa/setup",
            get(handlers::security::begin_mfa_setup)
                .post(handlers::security::confirm_mfa_setup)
                .delete(handlers::security::disable_mfa),
        )
        .route(
            "/users/@me/security/mfa/codes",
            get(handlers::security::list_recovery_codes)
                .delete(handlers::security::regenerate_recovery_codes),
        )
        .route(
            "/users/@me/security/sessions",
            get(handlers::security::list_sessions),
        )
        .route(
            "/users/@me/security/sessions/:id",
            delete(handlers::security::revoke_session),
        )
        .route(
            "/users/@me/connections",
            get(handlers::connections::list_connections),
        )
        .route(
            "/users/@me/connections/:id",
            delete(handlers::connections::revoke_connection),
        )
        .route(
            "/users/@me/applications",
            get(handlers::applications::list_applications)
                .post(handlers::applications::create_application),
        )
        .route(
            "/users/@me/applications/:id",
            patch(handlers::applications::update_application)
                .delete(handlers::applications::delete_application),
        )
        .route(
            "/users/@me/applications/:id/reset",
            post(handlers::applications::reset_application_secret),
        )
        .route(
            "/oauth2/authorize",
            get(handlers::oauth2::consent).post(handlers::oauth2::authorize),
        )
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .layer(from_fn_with_state(
            state.limiter(RateLimitClass::Client),
            rate_limit_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(login_routes)
        .merge(oauth2_routes)
        .merge(public_routes)
        .merge(client_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.http.allowed_origins));

    Ok(app)
}
