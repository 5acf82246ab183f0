use std::time::Duration;

use expensa_core::errors::{Error, Result};

pub const ENV_SERVICE_URL: &str = "EXPENSA_STATEMENT_SERVICE_URL";
pub const ENV_SERVICE_API_KEY: &str = "EXPENSA_STATEMENT_SERVICE_API_KEY";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "EXPENSA_STATEMENT_CONNECT_TIMEOUT_SECS";

/// Default time allowed to establish a connection to the service.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Location and credentials of the statement-processing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
}

impl StatementServiceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::MissingConfigKey(key.to_string()))
        };
        let base_url = required(ENV_SERVICE_URL)?;
        let api_key = required(ENV_SERVICE_API_KEY)?;

        let connect_timeout = match lookup(ENV_CONNECT_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                Error::InvalidConfigValue(format!(
                    "{}: '{}' is not a valid number",
                    ENV_CONNECT_TIMEOUT_SECS, raw
                ))
            })?,
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            base_url,
            api_key,
            connect_timeout,
        })
    }
}
