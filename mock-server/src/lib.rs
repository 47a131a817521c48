//! In-memory admin backend speaking the `{code, message, data, timestamp}`
//! envelope. Every route lives under `/api`; all of them except login need
//! a bearer token issued by `POST /api/auth/login`.
//!
//! Business failures (bad credentials, duplicate usernames) answer HTTP 200
//! with a non-200 envelope `code`. Missing or unknown tokens answer HTTP 401,
//! unknown user ids HTTP 404, both still wrapped in an envelope.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const SUCCESS_CODE: i64 = 200;
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const TOKEN_TTL_SECS: u64 = 7200;
const MAX_PAGE_SIZE: u32 = 100;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
    Guest,
}

impl Role {
    fn permissions(self) -> Vec<String> {
        let codes: &[&str] = match self {
            Role::Admin => &["user:view", "user:create", "user:update", "user:delete"],
            Role::User => &["user:view"],
            Role::Guest => &[],
        };
        codes.iter().map(|c| c.to_string()).collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: UserStatus,
    pub role: Role,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: i64,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq)]
pub struct Stats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub banned: u64,
    pub admin: u64,
    pub user: u64,
    pub guest: u64,
}

#[derive(Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: usize,
}

#[derive(Deserialize)]
pub struct BatchDelete {
    pub ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct PasswordInput {
    pub password: String,
}

#[derive(Deserialize)]
pub struct AvatarInput {
    pub avatar: String,
}

struct Account {
    user: User,
    password: String,
}

/// Accounts in creation order plus issued bearer tokens.
#[derive(Default)]
pub struct Backend {
    accounts: Vec<Account>,
    tokens: HashMap<String, String>,
}

impl Backend {
    /// A backend holding only the `admin` account.
    pub fn seeded() -> Self {
        let now = Utc::now();
        let admin = User {
            id: Uuid::new_v4().to_string(),
            username: ADMIN_USERNAME.to_string(),
            email: "admin@example.com".to_string(),
            name: "Administrator".to_string(),
            avatar: None,
            phone: None,
            status: UserStatus::Active,
            role: Role::Admin,
            permissions: Role::Admin.permissions(),
            created_at: now,
            updated_at: now,
        };
        Self {
            accounts: vec![Account {
                user: admin,
                password: ADMIN_PASSWORD.to_string(),
            }],
            tokens: HashMap::new(),
        }
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Account, ApiError> {
        self.accounts
            .iter_mut()
            .find(|a| a.user.id == id)
            .ok_or(ApiError::NotFound)
    }

    fn revoke_tokens_of(&mut self, ids: &[String]) {
        self.tokens.retain(|_, owner| !ids.contains(owner));
    }
}

pub type Db = Arc<RwLock<Backend>>;

/// Id of the account the bearer token belongs to.
#[derive(Clone)]
pub struct CurrentUser(pub String);

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound,
    Business { code: i64, message: String },
}

impl ApiError {
    fn business(code: i64, message: &str) -> Self {
        ApiError::Business {
            code,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, 401, "unauthorized".to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, 404, "user not found".to_string()),
            ApiError::Business { code, message } => (StatusCode::OK, code, message),
        };
        let body = Envelope::<()> {
            code,
            message,
            data: None,
            timestamp: Utc::now().timestamp_millis(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        code: SUCCESS_CODE,
        message: "success".to_string(),
        data: Some(data),
        timestamp: Utc::now().timestamp_millis(),
    }))
}

pub fn app() -> Router {
    app_with(Backend::seeded())
}

pub fn app_with(backend: Backend) -> Router {
    let db: Db = Arc::new(RwLock::new(backend));

    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route("/user/me", get(current_user))
        .route("/users", get(list_users).post(create_user))
        .route("/users/stats", get(user_stats))
        .route("/users/batch", delete(batch_delete))
        .route("/users/check-username/{username}", get(check_username))
        .route("/users/check-email/{email}", get(check_email))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/password", put(reset_password))
        .route("/users/{id}/avatar", put(update_avatar))
        .route_layer(middleware::from_fn_with_state(db.clone(), require_auth));

    let api = Router::new().route("/auth/login", post(login)).merge(protected);

    Router::new().nest("/api", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_auth(State(db): State<Db>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    let owner = db.read().await.tokens.get(token).cloned().ok_or(ApiError::Unauthorized)?;
    request.extensions_mut().insert(CurrentUser(owner));
    Ok(next.run(request).await)
}

async fn login(State(db): State<Db>, Json(input): Json<LoginInput>) -> ApiResult<Session> {
    let mut backend = db.write().await;
    let user = backend
        .accounts
        .iter()
        .find(|a| a.user.username == input.username && a.password == input.password)
        .map(|a| a.user.clone())
        .ok_or_else(|| ApiError::business(400, "invalid username or password"))?;
    if user.status == UserStatus::Banned {
        return Err(ApiError::business(403, "account is banned"));
    }

    let token = Uuid::new_v4().simple().to_string();
    backend.tokens.insert(token.clone(), user.id.clone());
    info!(username = %user.username, "issued token");
    ok(Session {
        token,
        refresh_token: Uuid::new_v4().simple().to_string(),
        expires_in: TOKEN_TTL_SECS,
        user,
    })
}

async fn logout(State(db): State<Db>, Extension(CurrentUser(id)): Extension<CurrentUser>) -> ApiResult<()> {
    db.write().await.revoke_tokens_of(&[id]);
    ok(())
}

async fn current_user(State(db): State<Db>, Extension(CurrentUser(id)): Extension<CurrentUser>) -> ApiResult<User> {
    let mut backend = db.write().await;
    ok(backend.find_mut(&id)?.user.clone())
}

async fn list_users(State(db): State<Db>, Query(query): Query<ListQuery>) -> ApiResult<Page> {
    let backend = db.read().await;
    let mut users: Vec<User> = backend
        .accounts
        .iter()
        .map(|a| &a.user)
        .filter(|u| contains_ignore_case(&u.username, query.username.as_deref()))
        .filter(|u| contains_ignore_case(&u.email, query.email.as_deref()))
        .filter(|u| query.status.map_or(true, |s| u.status == s))
        .filter(|u| query.role.map_or(true, |r| u.role == r))
        .cloned()
        .collect();

    if let Some(key) = query.sort_by.as_deref() {
        users.sort_by(|a, b| match key {
            "username" => a.username.cmp(&b.username),
            "email" => a.email.cmp(&b.email),
            "name" => a.name.cmp(&b.name),
            "updatedAt" => a.updated_at.cmp(&b.updated_at),
            _ => a.created_at.cmp(&b.created_at),
        });
        if query.sort_order.as_deref() == Some("desc") {
            users.reverse();
        }
    }

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
    let total = users.len() as u64;
    let total_pages = total.div_ceil(u64::from(page_size)) as u32;
    let data = users
        .into_iter()
        .skip((page as usize - 1).saturating_mul(page_size as usize))
        .take(page_size as usize)
        .collect();

    ok(Page {
        data,
        pagination: Pagination {
            page,
            page_size,
            total,
            total_pages,
        },
    })
}

async fn get_user(State(db): State<Db>, Path(id): Path<String>) -> ApiResult<User> {
    let mut backend = db.write().await;
    ok(backend.find_mut(&id)?.user.clone())
}

async fn create_user(State(db): State<Db>, Json(input): Json<CreateUser>) -> ApiResult<User> {
    if input.username.trim().is_empty() {
        return Err(ApiError::business(400, "username is required"));
    }
    if input.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::business(400, "password is too short"));
    }

    let mut backend = db.write().await;
    if backend.accounts.iter().any(|a| a.user.username == input.username) {
        return Err(ApiError::business(409, "username already exists"));
    }
    if backend.accounts.iter().any(|a| a.user.email == input.email) {
        return Err(ApiError::business(409, "email already exists"));
    }

    let now = Utc::now();
    let role = input.role.unwrap_or_default();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: input.username,
        email: input.email,
        name: input.name,
        avatar: None,
        phone: input.phone,
        status: UserStatus::Active,
        role,
        permissions: role.permissions(),
        created_at: now,
        updated_at: now,
    };
    debug!(id = %user.id, username = %user.username, "created user");
    backend.accounts.push(Account {
        user: user.clone(),
        password: input.password,
    });
    ok(user)
}

async fn update_user(State(db): State<Db>, Path(id): Path<String>, Json(input): Json<UpdateUser>) -> ApiResult<User> {
    let mut backend = db.write().await;
    if let Some(email) = &input.email {
        if backend.accounts.iter().any(|a| &a.user.email == email && a.user.id != id) {
            return Err(ApiError::business(409, "email already exists"));
        }
    }

    let user = &mut backend.find_mut(&id)?.user;
    if let Some(name) = input.name {
        user.name = name;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(phone) = input.phone {
        user.phone = Some(phone);
    }
    if let Some(avatar) = input.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(status) = input.status {
        user.status = status;
    }
    if let Some(role) = input.role {
        user.role = role;
        user.permissions = role.permissions();
    }
    if let Some(permissions) = input.permissions {
        user.permissions = permissions;
    }
    user.updated_at = Utc::now();
    ok(user.clone())
}

async fn delete_user(State(db): State<Db>, Path(id): Path<String>) -> ApiResult<()> {
    let mut backend = db.write().await;
    let before = backend.accounts.len();
    backend.accounts.retain(|a| a.user.id != id);
    if backend.accounts.len() == before {
        return Err(ApiError::NotFound);
    }
    backend.revoke_tokens_of(&[id]);
    ok(())
}

/// Ids that do not exist are skipped.
async fn batch_delete(State(db): State<Db>, Json(input): Json<BatchDelete>) -> ApiResult<Deleted> {
    let mut backend = db.write().await;
    let before = backend.accounts.len();
    backend.accounts.retain(|a| !input.ids.contains(&a.user.id));
    let deleted = before - backend.accounts.len();
    backend.revoke_tokens_of(&input.ids);
    ok(Deleted { deleted })
}

async fn reset_password(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<PasswordInput>,
) -> ApiResult<()> {
    if input.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::business(400, "password is too short"));
    }
    let mut backend = db.write().await;
    backend.find_mut(&id)?.password = input.password;
    ok(())
}

async fn update_avatar(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<AvatarInput>,
) -> ApiResult<User> {
    let mut backend = db.write().await;
    let user = &mut backend.find_mut(&id)?.user;
    user.avatar = Some(input.avatar);
    user.updated_at = Utc::now();
    ok(user.clone())
}

async fn user_stats(State(db): State<Db>) -> ApiResult<Stats> {
    let backend = db.read().await;
    let mut stats = Stats::default();
    for user in backend.accounts.iter().map(|a| &a.user) {
        stats.total += 1;
        match user.status {
            UserStatus::Active => stats.active += 1,
            UserStatus::Inactive => stats.inactive += 1,
            UserStatus::Banned => stats.banned += 1,
        }
        match user.role {
            Role::Admin => stats.admin += 1,
            Role::User => stats.user += 1,
            Role::Guest => stats.guest += 1,
        }
    }
    ok(stats)
}

async fn check_username(State(db): State<Db>, Path(username): Path<String>) -> ApiResult<Availability> {
    let backend = db.read().await;
    let available = !backend.accounts.iter().any(|a| a.user.username == username);
    ok(Availability { available })
}

async fn check_email(State(db): State<Db>, Path(email): Path<String>) -> ApiResult<Availability> {
    let backend = db.read().await;
    let available = !backend.accounts.iter().any(|a| a.user.email == email);
    ok(Availability { available })
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    needle.map_or(true, |n| haystack.to_lowercase().contains(&n.to_lowercase()))
}
