//! Typed user and auth endpoints.
//!
//! Each function picks a path, method and body, delegates to `HttpClient`
//! and unwraps the envelope to its `data`. No caching, no retries of its
//! own; every failure is whatever `HttpClient` translated it into.

use std::sync::Arc;

use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::client::{HttpClient, RequestOptions};
use crate::envelope::Page;
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::session::Session;
use crate::types::{Availability, CreateUserRequest, LoginRequest, UpdateUserRequest, User, UserListParams, UserStats};

#[derive(Serialize)]
struct BatchDelete<'a> {
    ids: &'a [String],
}

#[derive(Serialize)]
struct PasswordReset<'a> {
    password: &'a str,
}

#[derive(Serialize)]
struct AvatarUpdate<'a> {
    avatar: &'a str,
}

#[derive(Clone)]
pub struct UserApi {
    client: Arc<HttpClient>,
}

impl UserApi {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// `POST /auth/login`
    pub async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        Ok(self.client.post("/auth/login", request).await?.into_data())
    }

    /// `POST /auth/logout`
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.client
            .send::<IgnoredAny>(HttpMethod::Post, "/auth/logout", None, RequestOptions::default())
            .await?;
        Ok(())
    }

    /// `GET /user/me`
    pub async fn current_user(&self) -> Result<User, ApiError> {
        Ok(self.client.get("/user/me", RequestOptions::default()).await?.into_data())
    }

    /// `GET /users`
    pub async fn list_users(&self, params: &UserListParams) -> Result<Page<User>, ApiError> {
        let options = RequestOptions::with_query(params.to_query());
        Ok(self.client.get("/users", options).await?.into_data())
    }

    /// `GET /users/:id`
    pub async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        let path = format!("/users/{}", segment(id)?);
        Ok(self.client.get(&path, RequestOptions::default()).await?.into_data())
    }

    /// `POST /users`
    pub async fn create_user(&self, input: &CreateUserRequest) -> Result<User, ApiError> {
        Ok(self.client.post("/users", input).await?.into_data())
    }

    /// `PUT /users/:id`
    pub async fn update_user(&self, id: &str, input: &UpdateUserRequest) -> Result<User, ApiError> {
        let path = format!("/users/{}", segment(id)?);
        Ok(self.client.put(&path, input).await?.into_data())
    }

    /// `DELETE /users/:id`
    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/users/{}", segment(id)?);
        self.client.delete::<IgnoredAny>(&path, RequestOptions::default()).await?;
        Ok(())
    }

    /// `DELETE /users/batch` with `{ ids }` as the body.
    pub async fn batch_delete_users(&self, ids: &[String]) -> Result<(), ApiError> {
        let body = serde_json::to_value(BatchDelete { ids })
            .map_err(|e| ApiError::RequestSetup(format!("failed to serialize request body: {e}")))?;
        self.client
            .send::<IgnoredAny>(HttpMethod::Delete, "/users/batch", Some(body), RequestOptions::default())
            .await?;
        Ok(())
    }

    /// `PUT /users/:id/password`
    pub async fn reset_password(&self, id: &str, new_password: &str) -> Result<(), ApiError> {
        let path = format!("/users/{}/password", segment(id)?);
        self.client
            .put::<_, IgnoredAny>(&path, &PasswordReset { password: new_password })
            .await?;
        Ok(())
    }

    /// `PUT /users/:id/avatar`
    pub async fn update_avatar(&self, id: &str, avatar: &str) -> Result<User, ApiError> {
        let path = format!("/users/{}/avatar", segment(id)?);
        Ok(self.client.put(&path, &AvatarUpdate { avatar }).await?.into_data())
    }

    /// `GET /users/stats`
    pub async fn user_stats(&self) -> Result<UserStats, ApiError> {
        Ok(self.client.get("/users/stats", RequestOptions::default()).await?.into_data())
    }

    /// `GET /users/check-username/:username`
    pub async fn check_username(&self, username: &str) -> Result<Availability, ApiError> {
        let path = format!("/users/check-username/{}", segment(username)?);
        Ok(self.client.get(&path, RequestOptions::default()).await?.into_data())
    }

    /// `GET /users/check-email/:email`
    pub async fn check_email(&self, email: &str) -> Result<Availability, ApiError> {
        let path = format!("/users/check-email/{}", segment(email)?);
        Ok(self.client.get(&path, RequestOptions::default()).await?.into_data())
    }

    /// Escape hatch for endpoints without a typed wrapper.
    pub async fn raw(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        Ok(self
            .client
            .send(method, path, body, RequestOptions::default())
            .await?
            .into_data())
    }
}

/// Percent-encode a single path segment. Spaces become `%20`, not `+`.
///
/// Empty and dot-only values are rejected: URL resolution would collapse
/// them (`%2e` included) and address a different resource.
fn segment(raw: &str) -> Result<String, ApiError> {
    if raw.is_empty() || raw.chars().all(|c| c == '.') {
        return Err(ApiError::RequestSetup(format!("invalid path segment {raw:?}")));
    }
    Ok(form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::session::Credentials;
    use crate::storage::MemoryStorage;
    use crate::test_support::{envelope_ok, sample_user, user_json, Reply, ScriptedTransport};
    use crate::types::{Role, SortOrder, UserStatus};

    fn api() -> (UserApi, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new();
        let client = HttpClient::new(
            ClientConfig::new("http://localhost:3000/api"),
            transport.clone(),
            Credentials::new(Arc::new(MemoryStorage::new())),
        );
        (UserApi::new(Arc::new(client)), transport)
    }

    fn sent_body(transport: &ScriptedTransport) -> Value {
        let requests = transport.requests();
        serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn login_posts_credentials_and_returns_session() {
        let (api, transport) = api();
        let user = sample_user("u1", "alice");
        transport.push(Reply::Respond(envelope_ok(json!({
            "token": "t1", "refreshToken": "r1", "expiresIn": 3600, "user": user_json(&user)
        }))));

        let session = api.login(&LoginRequest::new("alice", "p@ss1234")).await.unwrap();

        assert_eq!(session.token, "t1");
        assert_eq!(session.refresh_token, "r1");
        assert_eq!(session.user, user);
        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/api/auth/login");
        assert_eq!(sent_body(&transport), json!({"username": "alice", "password": "p@ss1234"}));
    }

    #[tokio::test]
    async fn logout_ignores_response_data() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(json!({"revoked": true}))));
        api.logout().await.unwrap();
        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn list_users_sends_query_and_unwraps_page() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(json!({
            "data": [user_json(&sample_user("u1", "alice"))],
            "pagination": {"page": 1, "pageSize": 10, "total": 1, "totalPages": 1}
        }))));
        let mut params = UserListParams::new(1, 10);
        params.status = Some(UserStatus::Active);
        params.sort_order = Some(SortOrder::Asc);

        let page = api.list_users(&params).await.unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.pagination.unwrap().total, 1);
        assert_eq!(
            transport.requests()[0].url,
            "http://localhost:3000/api/users?page=1&pageSize=10&sortOrder=asc&status=active"
        );
    }

    #[tokio::test]
    async fn update_user_puts_partial_body() {
        let (api, transport) = api();
        let mut updated = sample_user("u2", "bob");
        updated.role = Role::Admin;
        transport.push(Reply::Respond(envelope_ok(user_json(&updated))));
        let input = UpdateUserRequest {
            role: Some(Role::Admin),
            ..Default::default()
        };

        let user = api.update_user("u2", &input).await.unwrap();

        assert_eq!(user, updated);
        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.url, "http://localhost:3000/api/users/u2");
        assert_eq!(sent_body(&transport), json!({"role": "admin"}));
    }

    #[tokio::test]
    async fn batch_delete_sends_ids_in_body() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(Value::Null)));
        api.batch_delete_users(&["u1".to_string(), "u2".to_string()])
            .await
            .unwrap();
        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, "http://localhost:3000/api/users/batch");
        assert_eq!(sent_body(&transport), json!({"ids": ["u1", "u2"]}));
    }

    #[tokio::test]
    async fn reset_password_and_avatar_paths() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(Value::Null)));
        transport.push(Reply::Respond(envelope_ok(user_json(&sample_user("u3", "carol")))));

        api.reset_password("u3", "N3wPassw0rd").await.unwrap();
        let user = api.update_avatar("u3", "/avatars/u3.png").await.unwrap();

        assert_eq!(user.id, "u3");
        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://localhost:3000/api/users/u3/password");
        assert_eq!(requests[1].url, "http://localhost:3000/api/users/u3/avatar");
        let avatar: Value = serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(avatar, json!({"avatar": "/avatars/u3.png"}));
    }

    #[tokio::test]
    async fn availability_checks_encode_path_segments() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(json!({"available": true}))));
        transport.push(Reply::Respond(envelope_ok(json!({"available": false}))));

        assert!(api.check_username("new user").await.unwrap().available);
        assert!(!api.check_email("a+b@example.com").await.unwrap().available);

        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://localhost:3000/api/users/check-username/new%20user");
        assert_eq!(
            requests[1].url,
            "http://localhost:3000/api/users/check-email/a%2Bb%40example.com"
        );
    }

    #[tokio::test]
    async fn stats_unwraps_counts() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(json!({
            "total": 5, "active": 3, "inactive": 1, "banned": 1, "admin": 1, "user": 3, "guest": 1
        }))));
        let stats = api.user_stats().await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.banned, 1);
    }

    #[tokio::test]
    async fn raw_returns_untyped_data() {
        let (api, transport) = api();
        transport.push(Reply::Respond(envelope_ok(json!({"ok": true}))));

        let data = api.raw(HttpMethod::Get, "/health", None).await.unwrap();

        assert_eq!(data, json!({"ok": true}));
        let req = &transport.requests()[0];
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/api/health");
    }

    #[tokio::test]
    async fn dot_segments_never_reach_the_transport() {
        let (api, transport) = api();

        let err = api.get_user("..").await.unwrap_err();
        assert!(matches!(err, ApiError::RequestSetup(_)), "{err:?}");
        let err = api.delete_user(".").await.unwrap_err();
        assert!(matches!(err, ApiError::RequestSetup(_)), "{err:?}");
        let err = api.check_username("").await.unwrap_err();
        assert!(matches!(err, ApiError::RequestSetup(_)), "{err:?}");

        assert!(transport.requests().is_empty());
    }

    #[rstest]
    #[case("u1", "u1")]
    #[case("a/b", "a%2Fb")]
    #[case("x y+z", "x%20y%2Bz")]
    #[case("...a", "...a")]
    #[case("v1.2", "v1.2")]
    fn segment_escapes_reserved_characters(#[case] raw: &str, #[case] encoded: &str) {
        assert_eq!(segment(raw).unwrap(), encoded);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("...")]
    fn segment_rejects_dot_and_empty_values(#[case] raw: &str) {
        assert!(matches!(segment(raw), Err(ApiError::RequestSetup(_))));
    }
}
