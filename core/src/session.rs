//! Authenticated session state and its durable copy.
//!
//! # Design
//! `Credentials` is the explicit auth state shared by `HttpClient` (which
//! reads the token for every request and clears it on 401) and `UserStore`
//! (which writes it on login and clears it on logout). It wraps an injected
//! `Storage`; the durable copy is best effort, so storage failures are
//! logged and never abort an in-memory transition.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{keys, Storage};
use crate::types::User;

/// Token pair plus the authenticated user's profile. This is also the
/// exact shape of the login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub user: User,
}

/// Receives control when the server reports the session as expired.
///
/// Injected into `HttpClient` in place of a hard-wired jump to the login
/// route. Called once per 401 response, after the stored session has been
/// cleared.
pub trait SessionExpiredHandler: Send + Sync {
    fn on_session_expired(&self);
}

impl<F> SessionExpiredHandler for F
where
    F: Fn() + Send + Sync,
{
    fn on_session_expired(&self) {
        self()
    }
}

/// Storage-backed token pair and session record.
#[derive(Clone)]
pub struct Credentials {
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("has_token", &self.token().is_some())
            .finish()
    }
}

impl Credentials {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn token(&self) -> Option<String> {
        self.read(keys::TOKEN).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(keys::REFRESH_TOKEN).filter(|t| !t.is_empty())
    }

    /// Persist the token pair and the session record.
    pub fn save(&self, session: &Session) {
        self.write(keys::TOKEN, &session.token);
        self.write(keys::REFRESH_TOKEN, &session.refresh_token);
        self.save_session_record(session);
    }

    /// Persist only the session record, e.g. after the embedded user changed.
    pub fn save_session_record(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => self.write(keys::USER_INFO, &json),
            Err(e) => warn!(error = %e, "failed to encode session record"),
        }
    }

    /// Rebuild the session from storage. The stored token pair is
    /// authoritative: without a token there is no session.
    pub fn load_session(&self) -> Option<Session> {
        let token = self.token()?;
        let raw = self.read(keys::USER_INFO)?;
        let mut session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unreadable session record");
                return None;
            }
        };
        session.token = token;
        session.refresh_token = self.refresh_token().unwrap_or_default();
        Some(session)
    }

    /// Remove the token pair and the session record together.
    pub fn clear(&self) {
        for key in [keys::TOKEN, keys::REFRESH_TOKEN, keys::USER_INFO] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to clear durable storage");
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "failed to read durable storage");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(key, error = %e, "failed to write durable storage");
        }
    }
}
