//! Configuration management.
//!
//! All settings come from environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `10000`.
//! - `MAILBOX_TTL_SECS` - Optional. Mailbox lifetime, refreshed by polling. Defaults to `600`.
//! - `PROVIDER_COOLDOWN_SECS` - Optional. Cooldown before re-probing an unhealthy provider. Defaults to `60`.
//! - `UPSTREAM_TIMEOUT_SECS` - Optional. Per-call upstream HTTP timeout. Defaults to `5`.
//! - `MAILTM_BASE_URL` - Optional. Override for the mail.tm API root.
//! - `ONESECMAIL_BASE_URL` - Optional. Override for the 1secmail API root.
//! - `ALLOWED_ORIGINS` - Optional. Comma-separated CORS origins for the frontend.

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_MAILTM_BASE_URL: &str = "https://api.mail.tm/";
const DEFAULT_ONESECMAIL_BASE_URL: &str = "https://www.1secmail.com/api/v1/";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:8080,https://maildrophq.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// How long a mailbox lives without activity
    pub mailbox_ttl: Duration,

    /// Cooldown applied to a demoted provider
    pub provider_cooldown: Duration,

    /// Bounded timeout for every upstream HTTP call
    pub upstream_timeout: Duration,

    /// mail.tm API root
    pub mail_tm_base_url: Url,

    /// 1secmail API root
    pub one_sec_mail_base_url: Url,

    /// CORS origins allowed to call the API
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 10_000)?;

        let mailbox_ttl = Duration::from_secs(parse_env("MAILBOX_TTL_SECS", 600)?);
        let provider_cooldown = Duration::from_secs(parse_env("PROVIDER_COOLDOWN_SECS", 60)?);
        let upstream_timeout = Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", 5)?);

        let mail_tm_base_url = parse_url("MAILTM_BASE_URL", DEFAULT_MAILTM_BASE_URL)?;
        let one_sec_mail_base_url = parse_url("ONESECMAIL_BASE_URL", DEFAULT_ONESECMAIL_BASE_URL)?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            mailbox_ttl,
            provider_cooldown,
            upstream_timeout,
            mail_tm_base_url,
            one_sec_mail_base_url,
            allowed_origins,
        })
    }

    /// Mailbox TTL as a chrono duration for expiry arithmetic.
    pub fn mailbox_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.mailbox_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(10))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_url(name: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{e}")))
}
