use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    #[param(example = "1187026352443101184")]
    pub client_id: String,
    #[param(example = "code")]
    pub response_type: String,
    #[param(example = "https://app.example.com/callback")]
    pub redirect_uri: String,
    /// `+` or space separated.
    #[param(example = "identify+email")]
    pub scope: String,
    pub state: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentApplication {
    pub id: String,
    pub name: String,
}

/// What the user is asked to approve.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentResponse {
    pub application: ConsentApplication,
    #[schema(example = json!(["identify", "email"]))]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenForm {
    /// Missing is treated like an unsupported grant, after client authentication.
    #[serde(default)]
    #[schema(example = "authorization_code")]
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    #[schema(example = "Bearer")]
    pub token_type: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    #[schema(example = 604800)]
    pub expires_in: i64,
    #[schema(example = "identify email")]
    pub scopes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeForm {
    pub token: String,
}
