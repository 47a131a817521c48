//! The uniform response wrapper returned by every endpoint.
//!
//! # Design
//! `parse_envelope` is the pure half of incoming interception: it turns an
//! `HttpResponse` into either a typed `Envelope<T>` or the `ApiError` the
//! status/code maps to. Side effects that some statuses require (401 session
//! teardown) live in `HttpClient`, so this function can be driven straight
//! from test vectors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, DEFAULT_FAILURE_MESSAGE};
use crate::http::HttpResponse;

/// Envelope `code` signalling success. Any other value is a failure even
/// when the HTTP status is 2xx.
pub const SUCCESS_CODE: i64 = 200;

/// `{ code, message, data, timestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: T,
    #[serde(default)]
    pub timestamp: i64,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> T {
        self.data
    }
}

/// Paging metadata attached to list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Wire shape before `data` is typed. `message` tolerates `null`.
#[derive(Deserialize)]
struct RawEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: i64,
}

/// Validate a response and decode its envelope.
///
/// Non-2xx statuses map through `status_error`. A 2xx body must be an
/// envelope with `code == SUCCESS_CODE` whose `data` decodes as `T`.
pub fn parse_envelope<T: DeserializeOwned>(response: &HttpResponse) -> Result<Envelope<T>, ApiError> {
    if !response.is_success() {
        return Err(status_error(response));
    }

    let raw: RawEnvelope = serde_json::from_str(&response.body)
        .map_err(|e| ApiError::RequestSetup(format!("invalid response envelope: {e}")))?;

    if raw.code != SUCCESS_CODE {
        return Err(ApiError::Business {
            code: raw.code,
            message: non_empty_or_default(raw.message),
        });
    }

    let data = serde_json::from_value(raw.data)
        .map_err(|e| ApiError::RequestSetup(format!("unexpected response data: {e}")))?;

    Ok(Envelope {
        code: raw.code,
        message: raw.message.unwrap_or_default(),
        data,
        timestamp: raw.timestamp,
    })
}

/// Map a non-2xx response to its error kind.
pub fn status_error(response: &HttpResponse) -> ApiError {
    match response.status {
        401 => ApiError::AuthExpired,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        500 => ApiError::Server,
        status => ApiError::UnknownHttp {
            status,
            message: server_message(&response.body),
        },
    }
}

/// The `message` field of an error body, if the body is JSON and carries one.
fn server_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_owned));
    non_empty_or_default(message)
}

fn non_empty_or_default(message: Option<String>) -> String {
    message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
}
