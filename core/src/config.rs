//! Client configuration.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api";

/// Per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// No automatic retry unless configured.
pub const DEFAULT_RETRY_COUNT: u32 = 0;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Settings consumed by `HttpClient`.
///
/// `retry_count` is the number of extra attempts for GET requests that fail
/// with a network-class error. Writes are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry_count: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Read `API_BASE_URL`, `API_TIMEOUT_MS` and `API_RETRY_COUNT`, falling
    /// back to the defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("API_BASE_URL") {
            Some(url) => Self::new(&url),
            None => Self::default(),
        };

        if let Some(raw) = lookup("API_TIMEOUT_MS") {
            let millis = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "API_TIMEOUT_MS",
                expected: "number of milliseconds",
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("API_RETRY_COUNT") {
            config.retry_count = raw.parse().map_err(|_| ConfigError::Invalid {
                name: "API_RETRY_COUNT",
                expected: "non-negative integer",
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
