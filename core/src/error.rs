//! Error types for the admin API client.
//!
//! # Design
//! `HttpClient` is the single place where failures are translated. Whatever
//! goes wrong below it (transport, status code, envelope code, JSON) reaches
//! callers as exactly one `ApiError` variant, so stores and UI code match on
//! a closed set instead of inspecting raw responses.

use thiserror::Error;

/// Message used when the server supplies none.
pub const DEFAULT_FAILURE_MESSAGE: &str = "request failed";

/// Every failure surfaced by the client, the API layer and the stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The envelope arrived but its `code` was not the success code.
    #[error("business error {code}: {message}")]
    Business { code: i64, message: String },

    /// HTTP 401. The stored session has already been torn down and the
    /// session-expired handler notified.
    #[error("session expired, please sign in again")]
    AuthExpired,

    /// HTTP 403.
    #[error("no permission")]
    Forbidden,

    /// HTTP 404.
    #[error("requested resource does not exist")]
    NotFound,

    /// HTTP 500.
    #[error("internal server error")]
    Server,

    /// Any other non-2xx status.
    #[error("HTTP {status}: {message}")]
    UnknownHttp { status: u16, message: String },

    /// No response was received: connection failure or timeout.
    #[error("network connection failed: {0}")]
    Network(String),

    /// Local failure: bad URL, body serialization, or an undecodable reply.
    #[error("request failed: {0}")]
    RequestSetup(String),
}

impl ApiError {
    /// Network-class failures are the only ones worth re-sending.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}

/// Failures reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request was sent (or attempted) but nothing came back.
    #[error("no response: {0}")]
    NoResponse(String),

    /// The transport gave up waiting.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The request could not be constructed or dispatched.
    #[error("invalid request: {0}")]
    Setup(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoResponse(msg) | TransportError::Timeout(msg) => ApiError::Network(msg),
            TransportError::Setup(msg) => ApiError::RequestSetup(msg),
        }
    }
}

/// Failures reported by a durable `Storage` backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage contents are not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Failures while loading `ClientConfig` from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}
