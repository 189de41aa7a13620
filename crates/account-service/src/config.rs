use crate::models::Provider;
use base64::{engine::general_purpose, Engine as _};
use common::secret::SecretBox;
use ring::signature::Ed25519KeyPair;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: u64 = 900;

/// Default refresh token lifetime (30 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: u64 = 2_592_000;

/// Default email-verification token lifetime (24 hours).
pub const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: u64 = 86_400;

/// Default login code lifetime (5 minutes).
pub const DEFAULT_LOGIN_CODE_TTL_SECONDS: u64 = 300;

/// Login codes live between 1 and 60 minutes.
pub const LOGIN_CODE_TTL_RANGE: RangeInclusive<u64> = 60..=3600;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Accepted bcrypt cost factors. Below 10 is too weak, above 14 too slow.
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 10..=14;

/// Default tolerance for token `iat` ahead of the local clock.
pub const DEFAULT_JWT_CLOCK_SKEW_SECONDS: u64 = 300;

/// Accepted clock skew tolerance.
pub const JWT_CLOCK_SKEW_RANGE: RangeInclusive<u64> = 1..=600;

/// Days an archived account is kept before it becomes eligible for purge.
pub const DEFAULT_ARCHIVE_RETENTION_DAYS: u64 = 30;

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_COMPENSATION_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_LIFECYCLE_EVENT_STREAM: &str = "account-lifecycle";

pub const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 3600;

pub const DEFAULT_PURGE_BATCH_SIZE: u32 = 100;

pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:9090";

const LOGIN_CODE_HASH_KEY_LEN: usize = 32;

pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// PKCS#8 Ed25519 private keys, one per token kind.
    pub access_token_key: SecretBox<Vec<u8>>,
    pub refresh_token_key: SecretBox<Vec<u8>>,
    pub email_token_key: SecretBox<Vec<u8>>,
    /// HMAC key for hashing stored login codes.
    pub login_code_hash_key: SecretBox<Vec<u8>>,
    pub profile_service_url: String,
    pub mail_service_url: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub email_token_ttl: Duration,
    pub login_code_ttl: Duration,
    pub archive_retention: Duration,
    pub step_timeout: Duration,
    pub compensation_timeout: Duration,
    pub bcrypt_cost: u32,
    pub jwt_clock_skew: Duration,
    pub lifecycle_event_stream: String,
    pub purge_interval: Duration,
    pub purge_batch_size: u32,
    pub metrics_bind_address: String,
    pub provider_userinfo_urls: HashMap<Provider, String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("access_token_key", &"[REDACTED]")
            .field("refresh_token_key", &"[REDACTED]")
            .field("email_token_key", &"[REDACTED]")
            .field("login_code_hash_key", &"[REDACTED]")
            .field("profile_service_url", &self.profile_service_url)
            .field("mail_service_url", &self.mail_service_url)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("email_token_ttl", &self.email_token_ttl)
            .field("login_code_ttl", &self.login_code_ttl)
            .field("archive_retention", &self.archive_retention)
            .field("step_timeout", &self.step_timeout)
            .field("compensation_timeout", &self.compensation_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("lifecycle_event_stream", &self.lifecycle_event_stream)
            .field("purge_interval", &self.purge_interval)
            .field("purge_batch_size", &self.purge_batch_size)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("provider_userinfo_urls", &self.provider_userinfo_urls)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid key material in {name}: {reason}")]
    InvalidKey { name: String, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let redis_url = required(vars, "REDIS_URL")?;
        let profile_service_url = required(vars, "PROFILE_SERVICE_URL")?;
        let mail_service_url = required(vars, "MAIL_SERVICE_URL")?;

        let access_token_key = signing_key(vars, "ACCESS_TOKEN_PRIVATE_KEY")?;
        let refresh_token_key = signing_key(vars, "REFRESH_TOKEN_PRIVATE_KEY")?;
        let email_token_key = signing_key(vars, "EMAIL_TOKEN_PRIVATE_KEY")?;

        let hash_key_name = "LOGIN_CODE_HASH_KEY";
        let login_code_hash_key = decode_base64(vars, hash_key_name)?;
        if login_code_hash_key.len() != LOGIN_CODE_HASH_KEY_LEN {
            return Err(ConfigError::InvalidKey {
                name: hash_key_name.to_string(),
                reason: format!(
                    "Expected {} bytes, got {}",
                    LOGIN_CODE_HASH_KEY_LEN,
                    login_code_hash_key.len()
                ),
            });
        }

        let access_token_ttl = Duration::from_secs(parse_or(
            vars,
            "ACCESS_TOKEN_TTL_SECONDS",
            DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
        )?);
        let refresh_token_ttl = Duration::from_secs(parse_or(
            vars,
            "REFRESH_TOKEN_TTL_SECONDS",
            DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        )?);
        let email_token_ttl = Duration::from_secs(parse_or(
            vars,
            "EMAIL_TOKEN_TTL_SECONDS",
            DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
        )?);
        for (name, ttl) in [
            ("ACCESS_TOKEN_TTL_SECONDS", access_token_ttl),
            ("REFRESH_TOKEN_TTL_SECONDS", refresh_token_ttl),
            ("EMAIL_TOKEN_TTL_SECONDS", email_token_ttl),
        ] {
            if ttl.is_zero() {
                return Err(invalid(name, "must be greater than zero"));
            }
        }

        let login_code_ttl = Duration::from_secs(parse_in_range(
            vars,
            "LOGIN_CODE_TTL_SECONDS",
            DEFAULT_LOGIN_CODE_TTL_SECONDS,
            &LOGIN_CODE_TTL_RANGE,
        )?);

        let bcrypt_cost = parse_in_range(
            vars,
            "BCRYPT_COST",
            DEFAULT_BCRYPT_COST,
            &BCRYPT_COST_RANGE,
        )?;

        let jwt_clock_skew = Duration::from_secs(parse_in_range(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_JWT_CLOCK_SKEW_SECONDS,
            &JWT_CLOCK_SKEW_RANGE,
        )?);

        let retention_days: u64 = parse_or(
            vars,
            "ARCHIVE_RETENTION_DAYS",
            DEFAULT_ARCHIVE_RETENTION_DAYS,
        )?;
        let archive_retention = Duration::from_secs(retention_days.saturating_mul(86_400));

        let step_timeout =
            Duration::from_millis(parse_or(vars, "STEP_TIMEOUT_MS", DEFAULT_STEP_TIMEOUT_MS)?);
        let compensation_timeout = Duration::from_millis(parse_or(
            vars,
            "COMPENSATION_TIMEOUT_MS",
            DEFAULT_COMPENSATION_TIMEOUT_MS,
        )?);
        if step_timeout.is_zero() {
            return Err(invalid("STEP_TIMEOUT_MS", "must be greater than zero"));
        }
        if compensation_timeout.is_zero() {
            return Err(invalid("COMPENSATION_TIMEOUT_MS", "must be greater than zero"));
        }

        let lifecycle_event_stream = vars
            .get("LIFECYCLE_EVENT_STREAM")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LIFECYCLE_EVENT_STREAM.to_string());

        let purge_interval = Duration::from_secs(parse_or(
            vars,
            "PURGE_INTERVAL_SECONDS",
            DEFAULT_PURGE_INTERVAL_SECONDS,
        )?);
        if purge_interval.is_zero() {
            return Err(invalid("PURGE_INTERVAL_SECONDS", "must be greater than zero"));
        }

        let purge_batch_size = parse_or(vars, "PURGE_BATCH_SIZE", DEFAULT_PURGE_BATCH_SIZE)?;
        if purge_batch_size == 0 {
            return Err(invalid("PURGE_BATCH_SIZE", "must be greater than zero"));
        }

        let metrics_bind_address = vars
            .get("METRICS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_METRICS_BIND_ADDRESS.to_string());

        let mut provider_userinfo_urls = HashMap::new();
        for provider in Provider::ALL {
            let name = format!("PROVIDER_{}_USERINFO_URL", provider.as_str().to_uppercase());
            if let Some(url) = vars.get(&name) {
                provider_userinfo_urls.insert(provider, url.clone());
            }
        }

        Ok(Config {
            database_url,
            redis_url,
            access_token_key,
            refresh_token_key,
            email_token_key,
            login_code_hash_key: SecretBox::new(Box::new(login_code_hash_key)),
            profile_service_url,
            mail_service_url,
            access_token_ttl,
            refresh_token_ttl,
            email_token_ttl,
            login_code_ttl,
            archive_retention,
            step_timeout,
            compensation_timeout,
            bcrypt_cost,
            jwt_clock_skew,
            lifecycle_event_stream,
            purge_interval,
            purge_batch_size,
            metrics_bind_address,
            provider_userinfo_urls,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn decode_base64(vars: &HashMap<String, String>, name: &str) -> Result<Vec<u8>, ConfigError> {
    let encoded = required(vars, name)?;
    general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConfigError::InvalidKey {
            name: name.to_string(),
            reason: format!("Base64 decode error: {e}"),
        })
}

fn signing_key(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<SecretBox<Vec<u8>>, ConfigError> {
    let pkcs8 = decode_base64(vars, name)?;
    Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8).map_err(|e| ConfigError::InvalidKey {
        name: name.to_string(),
        reason: format!("Not an Ed25519 PKCS#8 key: {e}"),
    })?;
    Ok(SecretBox::new(Box::new(pkcs8)))
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn parse_in_range<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    range: &RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
    T::Err: fmt::Display,
{
    let value = parse_or(vars, name, default)?;
    if !range.contains(&value) {
        return Err(invalid(
            name,
            format!(
                "{} is outside the allowed range {}..={}",
                value,
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(value)
}
