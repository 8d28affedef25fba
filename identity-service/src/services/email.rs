use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

/// Templated notifications sent to account holders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    VerifyEmail { displayname: String, token: String },
    VerifyLogin { displayname: String, token: String, location: String },
    PasswordModified { displayname: String },
    /// Sent to the previous address after an email change.
    EmailModified { displayname: String },
    AccountDeleted { displayname: String },
    PasswordReset { displayname: String, token: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::VerifyEmail { .. } => "verify_email",
            Notification::VerifyLogin { .. } => "verify_login",
            Notification::PasswordModified { .. } => "password_modified",
            Notification::EmailModified { .. } => "email_modified",
            Notification::AccountDeleted { .. } => "account_deleted",
            Notification::PasswordReset { .. } => "password_reset",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Notification::VerifyEmail { .. } => "Verify Your Email Address",
            Notification::VerifyLogin { .. } => "New Login Location",
            Notification::PasswordModified { .. } => "Your Password Was Changed",
            Notification::EmailModified { .. } => "Your Email Address Was Changed",
            Notification::AccountDeleted { .. } => "Your Account Was Deleted",
            Notification::PasswordReset { .. } => "Reset Your Password",
        }
    }

    pub fn plain_body(&self) -> String {
        match self {
            Notification::VerifyEmail { displayname, token } => format!(
                "Hi {displayname},\n\nUse the following token to verify your email address:\n\n{token}\n\nThis token expires in 24 hours."
            ),
            Notification::VerifyLogin {
                displayname,
                token,
                location,
            } => format!(
                "Hi {displayname},\n\nA login was attempted from {location}. If this was you, confirm it with:\n\n{token}\n\nThis token expires in 24 hours."
            ),
            Notification::PasswordModified { displayname } => format!(
                "Hi {displayname},\n\nYour password was just changed and your other sessions were signed out. If this wasn't you, reset your password immediately."
            ),
            Notification::EmailModified { displayname } => format!(
                "Hi {displayname},\n\nThe email address on your account was just changed and this address will no longer receive mail from us. If this wasn't you, contact support immediately."
            ),
            Notification::AccountDeleted { displayname } => format!(
                "Hi {displayname},\n\nYour account and all associated data have been deleted."
            ),
            Notification::PasswordReset { displayname, token } => format!(
                "Hi {displayname},\n\nUse the following token to set a new password:\n\n{token}\n\nThis token expires in 24 hours. If you didn't request this, please ignore this email."
            ),
        }
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, to: &str, notification: Notification) -> Result<(), anyhow::Error>;
}

/// Drops every message after logging it.
pub struct NoneEmail;

#[async_trait]
impl EmailProvider for NoneEmail {
    async fn send(&self, _to: &str, notification: Notification) -> Result<(), anyhow::Error> {
        tracing::info!(kind = notification.kind(), "Email provider disabled, skipping send");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    sender: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized with SMTP");

        Ok(Self {
            mailer,
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send(&self, to: &str, notification: Notification) -> Result<(), anyhow::Error> {
        let email = Message::builder()
            .from(self.sender.parse()?)
            .to(to.parse()?)
            .subject(notification.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.plain_body())?;

        // lettre's SmtpTransport is blocking
        let mailer = self.mailer.clone();
        tokio::task::spawn_blocking(move || mailer.send(&email)).await??;

        tracing::info!(kind = notification.kind(), "Email sent successfully");
        Ok(())
    }
}

/// Records every message for assertions.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send(&self, to: &str, notification: Notification) -> Result<(), anyhow::Error> {
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock email mutex poisoned: {}", e))?
            .push((to.to_string(), notification));
        Ok(())
    }
}
