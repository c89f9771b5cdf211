use std::collections::BTreeSet;
use std::num::ParseIntError;
use std::time::Duration;

use courier_error::StructuredError;

use crate::errors::{HttpError, HttpFailure, HttpResult};

pub const ENV_THROW_EXCEPTIONS: &str = "COURIER_THROW_EXCEPTIONS";
pub const ENV_THROW_ENTIRE_MESSAGE: &str = "COURIER_THROW_ENTIRE_MESSAGE";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "COURIER_REQUEST_TIMEOUT_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "COURIER_CONNECT_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "COURIER_MAX_RETRIES";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "COURIER_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "COURIER_RETRY_MAX_DELAY_MS";
pub const ENV_RETRY_NON_IDEMPOTENT: &str = "COURIER_RETRY_NON_IDEMPOTENT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not a boolean: {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} is not a non-negative integer: {value:?}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("retry base delay {base:?} exceeds max delay {max:?}")]
    DelayRange { base: Duration, max: Duration },
}

impl ConfigError {
    pub fn key(&self) -> &'static str {
        match self {
            ConfigError::InvalidBool { key, .. } | ConfigError::InvalidNumber { key, .. } => *key,
            ConfigError::DelayRange { .. } => ENV_RETRY_BASE_DELAY_MS,
        }
    }
}

impl From<ConfigError> for HttpError {
    fn from(err: ConfigError) -> Self {
        let key = err.key();
        StructuredError::wrap(
            format!("courier: invalid configuration for {key}"),
            HttpFailure::Configuration {
                key: key.to_string(),
                reason: err.to_string(),
            },
            err,
        )
    }
}

/// Runtime configuration for a [`crate::Client`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Raise an error for responses whose status is not unexceptional.
    pub throw_exceptions: bool,
    /// Include the response body in the error message.
    pub throw_entire_message: bool,
    pub unexceptional_statuses: BTreeSet<u16>,
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            throw_exceptions: true,
            throw_entire_message: false,
            unexceptional_statuses: default_unexceptional_statuses(),
            request_timeout: None,
            connect_timeout: None,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables the retry layer.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retry_statuses: BTreeSet<u16>,
    /// Raise `RetriesExhausted` around the last failure instead of returning it.
    pub wrap_exhausted: bool,
    /// Also retry methods that are not idempotent, such as POST.
    pub retry_non_idempotent: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            retry_statuses: default_retry_statuses(),
            wrap_exhausted: false,
            retry_non_idempotent: false,
        }
    }
}

pub fn default_unexceptional_statuses() -> BTreeSet<u16> {
    BTreeSet::from([200, 201, 202, 203, 204, 205, 206, 207, 300, 301, 302, 303, 304, 307])
}

pub fn default_retry_statuses() -> BTreeSet<u16> {
    BTreeSet::from([408, 429, 500, 502, 503, 504])
}

impl ClientConfig {
    pub fn from_env() -> HttpResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `COURIER_*` key.
    pub fn from_lookup<F>(lookup: F) -> HttpResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_THROW_EXCEPTIONS) {
            config.throw_exceptions = parse_bool(ENV_THROW_EXCEPTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_THROW_ENTIRE_MESSAGE) {
            config.throw_entire_message = parse_bool(ENV_THROW_ENTIRE_MESSAGE, &value)?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = Some(parse_millis(ENV_REQUEST_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout = Some(parse_millis(ENV_CONNECT_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            config.retry.max_retries = parse_number::<u32>(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BASE_DELAY_MS) {
            config.retry.base_delay = parse_millis(ENV_RETRY_BASE_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_MAX_DELAY_MS) {
            config.retry.max_delay = parse_millis(ENV_RETRY_MAX_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_NON_IDEMPOTENT) {
            config.retry.retry_non_idempotent = parse_bool(ENV_RETRY_NON_IDEMPOTENT, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::DelayRange {
                base: self.retry.base_delay,
                max: self.retry.max_delay,
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = ParseIntError>,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|source| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
            source,
        })
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_number::<u64>(key, value).map(Duration::from_millis)
}
