//! Scripted transport and fixtures shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{Role, User, UserStatus};

/// What the transport does for the next request.
pub(crate) enum Reply {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Wait until the test sends the response through the paired sender.
    Gated(oneshot::Receiver<HttpResponse>),
    /// Never answer.
    Hang,
}

/// Replays queued replies in request order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Queue a gated reply and return the sender that releases it.
    pub(crate) fn push_gated(&self) -> oneshot::Sender<HttpResponse> {
        let (tx, rx) = oneshot::channel();
        self.push(Reply::Gated(rx));
        tx
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Gated(rx)) => rx
                .await
                .map_err(|_| TransportError::NoResponse("gate dropped".into())),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(TransportError::NoResponse("no scripted reply".into())),
        }
    }
}

pub(crate) fn envelope_ok(data: Value) -> HttpResponse {
    HttpResponse::new(
        200,
        json!({"code": 200, "message": "ok", "data": data, "timestamp": 1_700_000_000_000_i64}).to_string(),
    )
}

pub(crate) fn envelope_error(code: i64, message: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        json!({"code": code, "message": message, "data": null, "timestamp": 1_700_000_000_000_i64}).to_string(),
    )
}

pub(crate) fn sample_user(id: &str, username: &str) -> User {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        name: String::new(),
        avatar: None,
        phone: None,
        status: UserStatus::Active,
        role: Role::User,
        permissions: Vec::new(),
        created_at: created,
        updated_at: created,
    }
}

pub(crate) fn user_json(user: &User) -> Value {
    serde_json::to_value(user).unwrap()
}
