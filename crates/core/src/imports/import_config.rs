use std::str::FromStr;
use std::time::Duration;

use super::imports_constants::*;
use crate::constants::BASE_CURRENCY;
use crate::errors::Error;
use crate::Result;

pub const ENV_MAX_CONCURRENT_IMPORTS: &str = "EXPENSA_MAX_CONCURRENT_IMPORTS";
pub const ENV_MAX_PENDING_IMPORTS_PER_OWNER: &str = "EXPENSA_MAX_PENDING_IMPORTS_PER_OWNER";
pub const ENV_MAX_UPLOAD_BYTES: &str = "EXPENSA_MAX_UPLOAD_BYTES";
pub const ENV_STATEMENT_TIMEOUT_SECS: &str = "EXPENSA_STATEMENT_TIMEOUT_SECS";
pub const ENV_BASE_CURRENCY: &str = "EXPENSA_BASE_CURRENCY";
pub const ENV_PROCESSING_LEASE_SECS: &str = "EXPENSA_PROCESSING_LEASE_SECS";

/// Tunables of the import queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportQueueConfig {
    /// Global ceiling of PROCESSING jobs across all owners.
    pub max_concurrent_jobs: usize,
    pub max_pending_jobs_per_owner: usize,
    pub max_upload_bytes: u64,
    pub statement_timeout: Duration,
    /// PROCESSING jobs older than this are failed by the reaper.
    /// `None` disables reaping.
    pub processing_lease: Option<Duration>,
}

impl Default for ImportQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_IMPORTS,
            max_pending_jobs_per_owner: MAX_PENDING_JOBS_PER_OWNER,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
            processing_lease: None,
        }
    }
}

impl ImportQueueConfig {
    /// Reads the configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_concurrent_jobs = parse_var(&lookup, ENV_MAX_CONCURRENT_IMPORTS)?
            .unwrap_or(defaults.max_concurrent_jobs);
        if max_concurrent_jobs == 0 {
            return Err(Error::InvalidConfigValue(format!(
                "{} must be at least 1",
                ENV_MAX_CONCURRENT_IMPORTS
            )));
        }

        let max_pending_jobs_per_owner = parse_var(&lookup, ENV_MAX_PENDING_IMPORTS_PER_OWNER)?
            .unwrap_or(defaults.max_pending_jobs_per_owner);
        let max_upload_bytes =
            parse_var(&lookup, ENV_MAX_UPLOAD_BYTES)?.unwrap_or(defaults.max_upload_bytes);
        let statement_timeout = parse_var::<u64, _>(&lookup, ENV_STATEMENT_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.statement_timeout);
        let processing_lease =
            parse_var::<u64, _>(&lookup, ENV_PROCESSING_LEASE_SECS)?.map(Duration::from_secs);

        // Only USD may be configured as the base currency.
        if let Some(raw) = lookup(ENV_BASE_CURRENCY) {
            if !raw.trim().eq_ignore_ascii_case(BASE_CURRENCY) {
                return Err(Error::InvalidConfigValue(format!(
                    "{}: '{}' is not supported; imported amounts are normalized to {}",
                    ENV_BASE_CURRENCY, raw, BASE_CURRENCY
                )));
            }
        }

        Ok(Self {
            max_concurrent_jobs,
            max_pending_jobs_per_owner,
            max_upload_bytes,
            statement_timeout,
            processing_lease,
        })
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn with_processing_lease(mut self, lease: Duration) -> Self {
        self.processing_lease = Some(lease);
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::InvalidConfigValue(format!("{}: '{}' is not a valid number", key, raw))
        }),
    }
}
