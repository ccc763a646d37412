//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `COMMERCE_BASE_URL` - Base URL of the commerce service (http or https)
//! - `COMMERCE_PUBLISHABLE_KEY` - Publishable API key sent with every request
//!
//! ## Optional
//! - `COMMERCE_REGION_ID` - Region forwarded on price-sensitive reads
//! - `COMMERCE_SALES_CHANNEL_ID` - Sales channel forwarded on price-sensitive reads
//! - `COMMERCE_DEFAULT_COUNTRY` - Country code for addresses without one (default: in)
//! - `COMMERCE_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `IDENTITY_RETRY_DELAY_MS` - Delay before the identity fetch retry (default: 2000)
//! - `CARTWHEEL_STATE_PATH` - Client state file (default: .cartwheel/state.json)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use cartwheel_core::{RegionId, SalesChannelId};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_COUNTRY: &str = "in";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDENTITY_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_STATE_PATH: &str = ".cartwheel/state.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Synchronization engine configuration.
///
/// Implements `Debug` manually to redact the publishable key.
#[derive(Clone)]
pub struct SyncConfig {
    /// Commerce service base URL
    pub base_url: Url,
    /// Publishable API key
    pub publishable_key: SecretString,
    /// Region forwarded on price/region-sensitive reads
    pub region_id: Option<RegionId>,
    /// Sales channel forwarded on price/region-sensitive reads
    pub sales_channel_id: Option<SalesChannelId>,
    /// Lowercase ISO country code used when a saved address has none
    pub default_country: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Delay before the identity guard's single retry
    pub identity_retry_delay: Duration,
    /// Where the CLI persists client state
    pub state_path: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("base_url", &self.base_url.as_str())
            .field("publishable_key", &"[REDACTED]")
            .field("region_id", &self.region_id)
            .field("sales_channel_id", &self.sales_channel_id)
            .field("default_country", &self.default_country)
            .field("request_timeout", &self.request_timeout)
            .field("identity_retry_delay", &self.identity_retry_delay)
            .field("state_path", &self.state_path)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .finish()
    }
}

impl SyncConfig {
    /// Build a configuration with defaults for everything optional.
    #[must_use]
    pub fn new(base_url: Url, publishable_key: SecretString) -> Self {
        Self {
            base_url,
            publishable_key,
            region_id: None,
            sales_channel_id: None,
            default_country: DEFAULT_COUNTRY.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            identity_retry_delay: Duration::from_millis(DEFAULT_IDENTITY_RETRY_DELAY_MS),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            sentry_dsn: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = parse_base_url("COMMERCE_BASE_URL", &get_required_env("COMMERCE_BASE_URL")?)?;
        let publishable_key = get_required_secret("COMMERCE_PUBLISHABLE_KEY")?;

        let request_timeout = Duration::from_secs(parse_u64(
            "COMMERCE_TIMEOUT_SECS",
            &get_env_or_default("COMMERCE_TIMEOUT_SECS", &DEFAULT_TIMEOUT_SECS.to_string()),
        )?);
        let identity_retry_delay = Duration::from_millis(parse_u64(
            "IDENTITY_RETRY_DELAY_MS",
            &get_env_or_default(
                "IDENTITY_RETRY_DELAY_MS",
                &DEFAULT_IDENTITY_RETRY_DELAY_MS.to_string(),
            ),
        )?);

        Ok(Self {
            base_url,
            publishable_key,
            region_id: get_optional_env("COMMERCE_REGION_ID").map(RegionId::from),
            sales_channel_id: get_optional_env("COMMERCE_SALES_CHANNEL_ID")
                .map(SalesChannelId::from),
            default_country: get_env_or_default("COMMERCE_DEFAULT_COUNTRY", DEFAULT_COUNTRY)
                .to_ascii_lowercase(),
            request_timeout,
            identity_retry_delay,
            state_path: PathBuf::from(get_env_or_default("CARTWHEEL_STATE_PATH", DEFAULT_STATE_PATH)),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable (empty counts as unset).
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse the service base URL, accepting only http(s).
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{other}' (expected http or https)"),
        )),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_accepts_http_and_https() {
        assert!(parse_base_url("K", "http://localhost:9000").is_ok());
        assert!(parse_base_url("K", "https://api.example.com/").is_ok());
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        let err = parse_base_url("COMMERCE_BASE_URL", "ftp://example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "COMMERCE_BASE_URL"));
        assert!(parse_base_url("K", "not a url").is_err());
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64("K", " 45 ").unwrap(), 45);
        assert!(matches!(
            parse_u64("K", "soon"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_new_applies_defaults() {
        let config = SyncConfig::new(
            Url::parse("http://localhost:9000").unwrap(),
            SecretString::from("pk_test"),
        );
        assert_eq!(config.default_country, "in");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.identity_retry_delay, Duration::from_millis(2000));
        assert_eq!(config.state_path, PathBuf::from(".cartwheel/state.json"));
        assert!(config.region_id.is_none());
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let mut config = SyncConfig::new(
            Url::parse("https://commerce.example.com").unwrap(),
            SecretString::from("pk_super_secret_value"),
        );
        config.sentry_dsn = Some("https://key@sentry.example.com/1".to_string());

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("commerce.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("pk_super_secret_value"));
        assert!(!debug_output.contains("key@sentry"));
    }
}
