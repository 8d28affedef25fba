//! Authorization-code and refresh-token flows.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;

use crate::dtos::oauth2::{
    AuthorizeParams, ConsentApplication, ConsentResponse, TokenForm, TokenResponse,
    GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, TOKEN_TYPE_BEARER,
};
use crate::models::{
    Application, Connection, Grant, Scopes, SessionContext, ACCESS_TOKEN_LIFETIME_SECONDS,
    GRANT_LIFETIME_SECONDS,
};
use crate::services::clock::Clock;
use crate::services::snowflake::SnowflakeGenerator;
use crate::services::store::IdentityStore;
use crate::services::ServiceError;
use crate::utils::{constant_time_eq, generate_token, is_token_format};

const RESPONSE_TYPE_CODE: &str = "code";

/// HTTP Basic credentials presented at the token endpoints.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// A token request whose form fields have passed shape checks.
#[derive(Debug, PartialEq, Eq)]
enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken { refresh_token: String },
    Unsupported,
}

impl TokenGrant {
    fn parse(form: &TokenForm) -> Result<Self, ServiceError> {
        match form.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => {
                let redirect_uri = form
                    .redirect_uri
                    .clone()
                    .filter(|uri| !uri.is_empty())
                    .ok_or(ServiceError::InvalidRedirectUri)?;
                let code = form
                    .code
                    .clone()
                    .filter(|code| is_token_format(code))
                    .ok_or(ServiceError::InvalidCode)?;
                Ok(TokenGrant::AuthorizationCode { code, redirect_uri })
            }
            GRANT_REFRESH_TOKEN => {
                let refresh_token = form
                    .refresh_token
                    .clone()
                    .filter(|token| is_token_format(token))
                    .ok_or(ServiceError::InvalidRefreshToken)?;
                Ok(TokenGrant::RefreshToken { refresh_token })
            }
            _ => Ok(TokenGrant::Unsupported),
        }
    }
}

#[derive(Serialize)]
struct CodeRedirect<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

fn parse_client_id(client_id: &str) -> Result<i64, ServiceError> {
    client_id
        .parse::<i64>()
        .map_err(|_| ServiceError::UnknownApplication)
}

fn token_response(connection: &Connection) -> TokenResponse {
    TokenResponse {
        token_type: TOKEN_TYPE_BEARER,
        access_token: connection.token_access.clone(),
        refresh_token: connection.token_refresh.clone(),
        expires_in: ACCESS_TOKEN_LIFETIME_SECONDS,
        scopes: connection.scopes.to_string(),
    }
}

#[derive(Clone)]
pub struct OAuth2Service {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<SnowflakeGenerator>,
}

impl OAuth2Service {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    /// Shared validation for the consent page and the approval.
    async fn validate_authorize(
        &self,
        ctx: &SessionContext,
        params: &AuthorizeParams,
    ) -> Result<(Application, Scopes), ServiceError> {
        ctx.require_user()?;
        if params.response_type != RESPONSE_TYPE_CODE {
            return Err(ServiceError::InvalidResponseType);
        }
        let scopes = Scopes::parse(&params.scope).ok_or(ServiceError::InvalidScope)?;
        let application_id = parse_client_id(&params.client_id)?;
        let application = self
            .store
            .find_application(application_id)
            .await?
            .ok_or(ServiceError::UnknownApplication)?;
        if !application.allows_redirect(&params.redirect_uri) {
            return Err(ServiceError::InvalidRedirectUri);
        }
        Ok((application, scopes))
    }

    pub async fn consent(
        &self,
        ctx: &SessionContext,
        params: &AuthorizeParams,
    ) -> Result<ConsentResponse, ServiceError> {
        let (application, scopes) = self.validate_authorize(ctx, params).await?;
        Ok(ConsentResponse {
            application: ConsentApplication {
                id: application.id.to_string(),
                name: application.name,
            },
            scopes: scopes.names().into_iter().map(String::from).collect(),
            redirect_uri: params.redirect_uri.clone(),
        })
    }

    /// Issue a grant and return the URL the user agent is sent back to.
    pub async fn authorize(
        &self,
        ctx: &SessionContext,
        params: &AuthorizeParams,
    ) -> Result<String, ServiceError> {
        let (application, scopes) = self.validate_authorize(ctx, params).await?;

        let grant = Grant {
            id: self.ids.next_id(),
            code: generate_token(),
            expires: self.clock.now() + Duration::seconds(GRANT_LIFETIME_SECONDS),
            user_id: ctx.user_id,
            application_id: application.id,
            redirect_uri: params.redirect_uri.clone(),
            scopes,
        };
        self.store.insert_grant(&grant).await?;

        let query = serde_urlencoded::to_string(CodeRedirect {
            code: &grant.code,
            state: params.state.as_deref(),
        })
        .map_err(|e| anyhow::anyhow!("Failed to encode redirect query: {}", e))?;
        let separator = if params.redirect_uri.contains('?') { '&' } else { '?' };

        tracing::info!(
            user_id = ctx.user_id,
            application_id = application.id,
            scopes = %scopes,
            "Authorization grant issued"
        );
        Ok(format!("{}{}{}", params.redirect_uri, separator, query))
    }

    /// Look up the application and check its secret in constant time.
    pub async fn authenticate_client(
        &self,
        application_id: i64,
        client_secret: &str,
    ) -> Result<Application, ServiceError> {
        let application = self
            .store
            .find_application(application_id)
            .await?
            .ok_or(ServiceError::UnknownApplication)?;
        if !constant_time_eq(&application.auth_secret, client_secret) {
            tracing::warn!(application_id, "Client authentication failed");
            return Err(ServiceError::Unauthenticated);
        }
        Ok(application)
    }

    pub async fn token(
        &self,
        client: Option<ClientCredentials>,
        form: &TokenForm,
    ) -> Result<TokenResponse, ServiceError> {
        let client = client.ok_or(ServiceError::Unauthenticated)?;
        let application_id = parse_client_id(&client.client_id)?;
        let application = self
            .authenticate_client(application_id, &client.client_secret)
            .await?;
        let grant = TokenGrant::parse(form)?;

        match grant {
            TokenGrant::AuthorizationCode { code, redirect_uri } => {
                self.exchange_code(&application, &code, &redirect_uri).await
            }
            TokenGrant::RefreshToken { refresh_token } => {
                self.refresh(&application, &refresh_token).await
            }
            TokenGrant::Unsupported => Err(ServiceError::InvalidGrantType),
        }
    }

    async fn exchange_code(
        &self,
        application: &Application,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let now = self.clock.now();
        // Consumed even when it turns out to belong elsewhere; it is never put back.
        let grant = self
            .store
            .consume_grant(code, now)
            .await?
            .ok_or(ServiceError::InvalidCode)?;
        if grant.application_id != application.id || grant.redirect_uri != redirect_uri {
            return Err(ServiceError::InvalidCode);
        }

        let connection = self
            .store
            .upsert_connection(&Connection {
                id: self.ids.next_id(),
                created: now,
                user_id: grant.user_id,
                application_id: application.id,
                revoked: false,
                scopes: grant.scopes,
                token_access: generate_token(),
                token_refresh: generate_token(),
                token_expires: now + Duration::seconds(ACCESS_TOKEN_LIFETIME_SECONDS),
            })
            .await?;

        tracing::info!(
            user_id = connection.user_id,
            application_id = application.id,
            connection_id = connection.id,
            "Authorization code exchanged"
        );
        Ok(token_response(&connection))
    }

    async fn refresh(
        &self,
        application: &Application,
        refresh_token: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let expires = self.clock.now() + Duration::seconds(ACCESS_TOKEN_LIFETIME_SECONDS);
        let rotated = self
            .store
            .rotate_connection_tokens(
                refresh_token,
                application.id,
                &generate_token(),
                &generate_token(),
                expires,
            )
            .await?;

        match rotated {
            Some(connection) => {
                tracing::info!(
                    connection_id = connection.id,
                    application_id = application.id,
                    "Connection tokens rotated"
                );
                Ok(token_response(&connection))
            }
            None => {
                let existing = self
                    .store
                    .find_connection_by_refresh_token(refresh_token, application.id)
                    .await?;
                match existing {
                    Some(connection) if connection.revoked => Err(ServiceError::AccessRevoked),
                    _ => Err(ServiceError::Unauthenticated),
                }
            }
        }
    }

    pub async fn revoke(
        &self,
        client: Option<ClientCredentials>,
        token: &str,
    ) -> Result<(), ServiceError> {
        let client = client.ok_or(ServiceError::Unauthenticated)?;
        let application_id = parse_client_id(&client.client_id)?;
        let application = self
            .authenticate_client(application_id, &client.client_secret)
            .await?;

        if !is_token_format(token)
            || !self
                .store
                .revoke_connection_by_token(token, application.id)
                .await?
        {
            return Err(ServiceError::UnknownConnection);
        }
        tracing::info!(application_id = application.id, "Connection revoked by client");
        Ok(())
    }
}
