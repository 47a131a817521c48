//! HTTP client core: request/response interception over a pluggable transport.
//!
//! # Design
//! `HttpClient` splits every call the same way the interceptors of a
//! browser HTTP stack would:
//! - `build_request` is the outgoing step. It is synchronous: resolve the
//!   URL, attach `Authorization` from `Credentials` and `X-Request-Time`.
//! - `intercept_response` is the incoming step. It validates the envelope
//!   via `parse_envelope` and performs the one side effect the core owns:
//!   on 401 it clears the stored session and notifies the injected
//!   `SessionExpiredHandler`.
//!
//! `send` ties the two together around a `Transport`, bounding every
//! attempt with `ClientConfig::timeout`. GET requests that fail with a
//! network-class error are re-sent up to `ClientConfig::retry_count` times;
//! nothing else is ever retried.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::envelope::{parse_envelope, Envelope};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, AUTHORIZATION, CONTENT_TYPE, X_REQUEST_TIME};
use crate::session::{Credentials, SessionExpiredHandler};
use crate::transport::{ReqwestTransport, Transport};

/// Per-call extras: query pairs appended to the URL and additional headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn with_query(query: Vec<(String, String)>) -> Self {
        Self {
            query,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

pub struct HttpClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    on_session_expired: Option<Arc<dyn SessionExpiredHandler>>,
}

impl HttpClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        Self {
            config,
            transport,
            credentials,
            on_session_expired: None,
        }
    }

    /// Client over a `ReqwestTransport` configured with the same timeout.
    pub fn with_reqwest(config: ClientConfig, credentials: Credentials) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::new(config, Arc::new(transport), credentials))
    }

    /// Install the handler invoked after a 401 has torn down the session.
    pub fn on_session_expired(mut self, handler: Arc<dyn SessionExpiredHandler>) -> Self {
        self.on_session_expired = Some(handler);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Outgoing interception. Never awaits.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let url = self.resolve(path, &options.query)?;

        let mut headers = vec![(CONTENT_TYPE.to_string(), "application/json".to_string())];
        if let Some(token) = self.credentials.token() {
            headers.push((AUTHORIZATION.to_string(), format!("Bearer {token}")));
        }
        headers.push((X_REQUEST_TIME.to_string(), Utc::now().timestamp_millis().to_string()));
        headers.extend(options.headers.iter().cloned());

        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::RequestSetup(format!("failed to serialize request body: {e}")))?;

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Incoming interception.
    pub fn intercept_response<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<Envelope<T>, ApiError> {
        match parse_envelope(response) {
            Err(ApiError::AuthExpired) => {
                self.expire_session();
                Err(ApiError::AuthExpired)
            }
            other => other,
        }
    }

    pub async fn send<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Envelope<T>, ApiError> {
        let max_attempts = if method.is_idempotent_read() {
            self.config.retry_count.saturating_add(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let request = self.build_request(method, path, body.as_ref(), &options)?;
            debug!(%method, url = %request.url, attempt, "sending request");
            match self.dispatch(request).await {
                Ok(response) => {
                    debug!(%method, path, status = response.status, "received response");
                    return self.intercept_response(&response);
                }
                Err(e) if e.is_network() && attempt < max_attempts => {
                    warn!(%method, path, attempt, error = %e, "retrying after network failure");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<Envelope<T>, ApiError> {
        self.send(HttpMethod::Get, path, None, options).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Post, path, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Put, path, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Patch, path, Some(to_body(body)?), RequestOptions::default())
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<Envelope<T>, ApiError> {
        self.send(HttpMethod::Delete, path, None, options).await
    }

    /// Execute one attempt, bounded by the configured timeout.
    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        match tokio::time::timeout(self.config.timeout, self.transport.execute(request)).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::Network(format!(
                "request timed out after {}ms",
                self.config.timeout.as_millis()
            ))),
        }
    }

    fn expire_session(&self) {
        warn!("session expired, clearing stored credentials");
        self.credentials.clear();
        if let Some(handler) = &self.on_session_expired {
            handler.on_session_expired();
        }
    }

    fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<String, ApiError> {
        let joined = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url =
            Url::parse(&joined).map_err(|e| ApiError::RequestSetup(format!("invalid request URL {joined:?}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url.into())
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::RequestSetup(format!("failed to serialize request body: {e}")))
}
