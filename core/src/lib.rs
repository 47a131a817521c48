//! Client core for the SynapseUI admin console.
//!
//! # Overview
//! Three layers, each usable on its own:
//! - `HttpClient` builds requests, sends them through a `Transport` and
//!   interprets the `{code, message, data}` envelope every backend
//!   response is wrapped in.
//! - `UserApi` maps the user and auth endpoints onto typed calls.
//! - `UserStore` and `AppStore` hold the client-side state: the signed-in
//!   session, a cached page of users and shell preferences.
//!
//! # Design
//! - I/O sits behind the `Transport` trait. `ReqwestTransport` is the real
//!   one; tests script responses instead.
//! - Durable state sits behind the `Storage` trait (`MemoryStorage`,
//!   `FileStorage`). Nothing reaches for a global.
//! - Session expiry is reported to an injected `SessionExpiredHandler`
//!   rather than navigating anywhere.
//! - DTOs are defined independently from the mock-server crate; the
//!   integration tests catch schema drift.

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;
pub mod types;

mod sync;

#[cfg(test)]
mod test_support;

pub use api::UserApi;
pub use client::{HttpClient, RequestOptions};
pub use config::ClientConfig;
pub use envelope::{parse_envelope, status_error, Envelope, Page, Pagination};
pub use error::{ApiError, ConfigError, StorageError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{Credentials, Session, SessionExpiredHandler};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{AppStore, UserStore};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    Availability, CreateUserRequest, LoginRequest, Role, SortOrder, UpdateUserRequest, User, UserListParams,
    UserStats, UserStatus,
};
