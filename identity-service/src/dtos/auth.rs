use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 256, message = "Email must be at most 256 characters")
    )]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 3, max = 32, message = "Username must be 3 to 32 characters"))]
    #[schema(example = "alice_01", min_length = 3, max_length = 32)]
    pub username: String,

    #[validate(length(min = 8, max = 64, message = "Password must be 8 to 64 characters"))]
    #[schema(example = "password123", min_length = 8, max_length = 64)]
    pub password: String,
}

impl SignupRequest {
    /// Letters, digits and underscores only.
    pub fn has_valid_username(&self) -> bool {
        self.username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    }
}

/// Body for the emailed-token endpoints.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, max = 64, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,

    /// TOTP passcode or recovery code, required once MFA is enabled.
    #[schema(example = "123456")]
    pub passcode: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, max = 64, message = "Password must be 8 to 64 characters"))]
    #[schema(example = "newpassword123", min_length = 8, max_length = 64)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str) -> SignupRequest {
        SignupRequest {
            email: "user@example.com".to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
        }
    }

    #[test]
    fn username_charset() {
        assert!(signup("alice_01").has_valid_username());
        assert!(!signup("alice-01").has_valid_username());
        assert!(!signup("al ice").has_valid_username());
    }

    #[test]
    fn signup_length_rules() {
        assert!(signup("alice").validate().is_ok());
        assert!(signup("al").validate().is_err());
        let mut req = signup("alice");
        req.password = "short".to_string();
        assert!(req.validate().is_err());
    }
}
