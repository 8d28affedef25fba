use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::snowflake::MAX_INSTANCE_ID;
use crate::utils::{parse_trusted_proxies, ClientIpConfig};

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub machine_id: u32,
    pub rate_limit: RateLimitProvider,
    pub http: HttpConfig,
    pub totp_issuer: String,
    pub email: EmailConfig,
    pub storage: StorageConfig,
    pub background_queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Upper bound for every store call.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitProvider {
    None,
    Local,
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    /// Set the `Secure` attribute on the session cookie.
    pub cookie_secure: bool,
    pub client_ip: ClientIpConfig,
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            client_ip: ClientIpConfig::default(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EmailConfig {
    None,
    Smtp(SmtpConfig),
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    None,
    Disk { path: PathBuf },
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                timeout: Duration::from_millis(parse_env("DATABASE_TIMEOUT_MS", "10000", is_prod)?),
            },
            machine_id: parse_env("MACHINE_ID", "0", is_prod)?,
            rate_limit: match get_env("RATELIMIT_PROVIDER", Some("local"), is_prod)?
                .to_lowercase()
                .as_str()
            {
                "none" => RateLimitProvider::None,
                "local" => RateLimitProvider::Local,
                "redis" => RateLimitProvider::Redis {
                    url: get_env("REDIS_URL", None, true)?,
                },
                other => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "Invalid RATELIMIT_PROVIDER: {}",
                        other
                    )))
                }
            },
            http: HttpConfig {
                cookie_name: get_env("HTTP_COOKIE_NAME", Some("session"), is_prod)?,
                cookie_domain: get_optional_env("HTTP_COOKIE_DOMAIN"),
                cookie_secure: is_prod,
                client_ip: ClientIpConfig {
                    headers: split_list(&get_optional_env("HTTP_IP_HEADERS").unwrap_or_default()),
                    trusted_proxies: parse_trusted_proxies(&split_list(
                        &get_env("HTTP_IP_PROXIES", Some("127.0.0.1/8"), false)?,
                    ))
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid HTTP_IP_PROXIES: {}", e))
                    })?,
                },
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
            totp_issuer: get_env("TOTP_ISSUER", Some("Identity"), is_prod)?,
            email: match get_env("EMAIL_PROVIDER", Some("none"), is_prod)?
                .to_lowercase()
                .as_str()
            {
                "none" => EmailConfig::None,
                "smtp" => EmailConfig::Smtp(SmtpConfig {
                    host: get_env("SMTP_HOST", None, true)?,
                    port: parse_env("SMTP_PORT", "587", is_prod)?,
                    user: get_env("SMTP_USER", None, true)?,
                    password: get_env("SMTP_PASSWORD", None, true)?,
                    sender: get_env("EMAIL_SENDER", None, true)?,
                }),
                other => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "Invalid EMAIL_PROVIDER: {}",
                        other
                    )))
                }
            },
            storage: match get_env("STORAGE_PROVIDER", Some("none"), is_prod)?
                .to_lowercase()
                .as_str()
            {
                "none" => StorageConfig::None,
                "disk" => StorageConfig::Disk {
                    path: PathBuf::from(get_env("STORAGE_DISK_PATH", None, true)?),
                },
                other => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "Invalid STORAGE_PROVIDER: {}",
                        other
                    )))
                }
            },
            background_queue_capacity: parse_env("BACKGROUND_QUEUE_CAPACITY", "256", is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.machine_id > u32::from(MAX_INSTANCE_ID) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MACHINE_ID must be between 0 and {}",
                MAX_INSTANCE_ID
            )));
        }

        if self.database.timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_TIMEOUT_MS must be positive"
            )));
        }

        if self.background_queue_capacity == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BACKGROUND_QUEUE_CAPACITY must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.http.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.rate_limit == RateLimitProvider::None {
                tracing::error!("Rate limiting is disabled in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
