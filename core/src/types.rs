//! Domain DTOs for the admin API.
//!
//! # Design
//! These types mirror the backend's camelCase JSON schema but are defined
//! independently of the mock-server crate; the end-to-end tests catch any
//! drift between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Banned => "banned",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    #[default]
    Guest,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }
}

/// A user record. `id` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: UserStatus,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Partial update. Only fields present in the JSON are applied; omitted
/// fields stay unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha: Option<String>,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            remember: None,
            role: None,
            captcha: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query for `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListParams {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
}

impl Default for UserListParams {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl UserListParams {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            sort_by: None,
            sort_order: None,
            username: None,
            email: None,
            status: None,
            role: None,
        }
    }

    /// Query pairs in wire order. Page is at least 1; page size is clamped
    /// to `1..=MAX_PAGE_SIZE`.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), self.page.max(1).to_string()),
            (
                "pageSize".to_string(),
                self.page_size.clamp(1, MAX_PAGE_SIZE).to_string(),
            ),
        ];
        let optional = [
            ("sortBy", self.sort_by.clone()),
            ("sortOrder", self.sort_order.map(|o| o.as_str().to_string())),
            ("username", self.username.clone()),
            ("email", self.email.clone()),
            ("status", self.status.map(|s| s.as_str().to_string())),
            ("role", self.role.map(|r| r.as_str().to_string())),
        ];
        query.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key.to_string(), v))),
        );
        query
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub banned: u64,
    pub admin: u64,
    pub user: u64,
    pub guest: u64,
}

/// Result of the username / email availability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_deserializes_from_camel_case() {
        let user: User = serde_json::from_str(
            r#"{
                "id":"u1","username":"alice","email":"alice@example.com","name":"Alice",
                "status":"active","role":"admin","permissions":["user:view"],
                "createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-02T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.avatar.is_none());
        assert_eq!(user.permissions, vec!["user:view".to_string()]);
    }

    #[test]
    fn update_request_omits_absent_fields() {
        let input = UpdateUserRequest {
            name: Some("Alice B".into()),
            status: Some(UserStatus::Banned),
            ..Default::default()
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Alice B", "status": "banned"}));
    }

    #[test]
    fn list_params_serialize_only_present_filters() {
        let mut params = UserListParams::new(2, 20);
        params.sort_by = Some("createdAt".into());
        params.sort_order = Some(SortOrder::Desc);
        params.role = Some(Role::User);
        let query = params.to_query();
        let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                ("page", "2"),
                ("pageSize", "20"),
                ("sortBy", "createdAt"),
                ("sortOrder", "desc"),
                ("role", "user"),
            ]
        );
    }

    #[test]
    fn list_params_clamp_page_size() {
        let query = UserListParams::new(0, 500).to_query();
        assert_eq!(query[0], ("page".to_string(), "1".to_string()));
        assert_eq!(query[1], ("pageSize".to_string(), "100".to_string()));
    }
}
