pub mod auth;
pub mod oauth2;
pub mod users;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Escalation Required")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 5070)]
    pub code: Option<u32>,
}
