//! Client configuration read from the environment (and an optional `.env` file).

use std::time::Duration;

/// Default interval between snapshot fetches.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Default base URL of the workflow API.
const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Monitor configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Base URL of the workflow API, without trailing slash.
    pub api_url: String,
    /// Static bearer token. Production callers usually supply a
    /// [`CredentialSource`](crate::auth::CredentialSource) backed by the
    /// session store instead.
    pub api_token: Option<String>,
    /// Delay between the end of one snapshot fetch and the next.
    pub poll_interval: Duration,
    /// Close a stream that delivers nothing for this long. `None` relies on
    /// the transport's own timeouts.
    pub stream_idle_timeout: Option<Duration>,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stream_idle_timeout: None,
        }
    }
}

impl MonitorConfig {
    /// Apply a `.env` file (if present) and then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                        |
    /// |----------------------------|--------------------------------|
    /// | `WORKFLOW_API_URL`         | `http://localhost:8000/api/v1` |
    /// | `WORKFLOW_API_TOKEN`       | unset                          |
    /// | `POLL_INTERVAL_MS`         | `2000`                         |
    /// | `STREAM_IDLE_TIMEOUT_SECS` | unset (disabled)               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("WORKFLOW_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_token = lookup("WORKFLOW_API_TOKEN").filter(|token| !token.trim().is_empty());

        let poll_interval_ms = match lookup("POLL_INTERVAL_MS") {
            Some(value) => parse_positive("POLL_INTERVAL_MS", &value)?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let stream_idle_timeout = lookup("STREAM_IDLE_TIMEOUT_SECS")
            .map(|value| parse_positive("STREAM_IDLE_TIMEOUT_SECS", &value))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            api_url,
            api_token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            stream_idle_timeout,
        })
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}
