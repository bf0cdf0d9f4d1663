//! Client configuration: service endpoint, polling policy and the
//! defaults applied to jobs that do not carry their own.

use std::str::FromStr;
use std::time::Duration;

use analysis_core::Oid;
use serde_json::Value;

use crate::poll::PollConfig;
use crate::service::{ResultParams, DEFAULT_COMPRESSION, DEFAULT_FORMAT};

/// Filters applied to a computation. Only the selection is read here;
/// its contents are passed to the service untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub selection: Option<Value>,
}

impl Filters {
    pub fn new(selection: Value) -> Self {
        Self {
            selection: Some(selection),
        }
    }
}

/// Client configuration loaded from environment variables.
///
/// `default_filters` is the fallback selection for jobs computed without
/// their own selection or explicit filters. It is never read from the
/// environment; set it with [`ClientConfig::with_default_filters`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the analysis API.
    pub api_url: String,
    /// Optional bearer token sent with every request.
    pub api_token: Option<String>,
    /// Query parameters for the results endpoint.
    pub result_params: ResultParams,
    /// Backoff and budget for the "still computing" poll loop.
    pub poll: PollConfig,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub default_filters: Filters,
    /// Domain given to jobs submitted without any domain.
    pub default_domain_id: Option<Oid>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl ClientConfig {
    /// Configuration for `api_url` with every other field at its default.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: None,
            result_params: ResultParams::default(),
            poll: PollConfig::default(),
            request_timeout: Duration::from_secs(60),
            default_filters: Filters::default(),
            default_domain_id: None,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default    |
    /// |----------------------------------|------------|
    /// | `ANALYSIS_API_URL`               | (required) |
    /// | `ANALYSIS_API_TOKEN`             | unset      |
    /// | `ANALYSIS_RESULT_FORMAT`         | `json`     |
    /// | `ANALYSIS_RESULT_COMPRESSION`    | `none`     |
    /// | `ANALYSIS_POLL_INITIAL_DELAY_MS` | `250`      |
    /// | `ANALYSIS_POLL_MAX_DELAY_MS`     | `10000`    |
    /// | `ANALYSIS_POLL_MAX_ATTEMPTS`     | `600` (`0` = no cap)   |
    /// | `ANALYSIS_POLL_DEADLINE_SECS`    | `1800` (`0` = no deadline) |
    /// | `ANALYSIS_REQUEST_TIMEOUT_SECS`  | `60`       |
    /// | `ANALYSIS_DEFAULT_DOMAIN_ID`     | unset      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("ANALYSIS_API_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("ANALYSIS_API_URL"))?;

        let api_token = lookup("ANALYSIS_API_TOKEN").filter(|s| !s.is_empty());
        let default_domain_id = lookup("ANALYSIS_DEFAULT_DOMAIN_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Oid::from);

        let result_params = ResultParams {
            format: lookup("ANALYSIS_RESULT_FORMAT").unwrap_or_else(|| DEFAULT_FORMAT.into()),
            compression: lookup("ANALYSIS_RESULT_COMPRESSION")
                .unwrap_or_else(|| DEFAULT_COMPRESSION.into()),
        };

        let defaults = PollConfig::default();
        let initial_ms: u64 = parse_var(&lookup, "ANALYSIS_POLL_INITIAL_DELAY_MS", 250)?;
        let max_ms: u64 = parse_var(&lookup, "ANALYSIS_POLL_MAX_DELAY_MS", 10_000)?;
        let max_attempts: u32 = parse_var(&lookup, "ANALYSIS_POLL_MAX_ATTEMPTS", 600)?;
        let deadline_secs: u64 = parse_var(&lookup, "ANALYSIS_POLL_DEADLINE_SECS", 1800)?;
        let timeout_secs: u64 = parse_var(&lookup, "ANALYSIS_REQUEST_TIMEOUT_SECS", 60)?;

        let poll = PollConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
            ..defaults
        };

        Ok(Self {
            api_url: api_url.trim().to_string(),
            api_token,
            result_params,
            poll,
            request_timeout: Duration::from_secs(timeout_secs),
            default_filters: Filters::default(),
            default_domain_id,
        })
    }

    pub fn with_default_filters(mut self, filters: Filters) -> Self {
        self.default_filters = filters;
        self
    }

    pub fn with_default_domain(mut self, domain_id: impl Into<Oid>) -> Self {
        self.default_domain_id = Some(domain_id.into());
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
