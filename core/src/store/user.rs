//! Session and user-collection cache.
//!
//! # Design
//! `UserStore` applies a mutation to its cache only after the server has
//! confirmed it: each operation issues one call through `UserApi`, and the
//! returned record is merged in on success. Nothing is applied up front,
//! so nothing needs rolling back on failure.
//!
//! The state lock is held only while reading or writing memory, never
//! across a network call. Concurrent operations therefore race: whichever
//! completes last wins, and the `loading` flag is a plain boolean owned by
//! whichever call touched it last, not a count of calls in flight.

use std::cmp::Ordering;
use std::sync::RwLock;

use tracing::{debug, error, info, warn};

use crate::api::UserApi;
use crate::envelope::Pagination;
use crate::error::ApiError;
use crate::session::{Credentials, Session};
use crate::sync;
use crate::types::{
    CreateUserRequest, LoginRequest, Role, SortOrder, UpdateUserRequest, User, UserListParams, UserStats, UserStatus,
};

/// Shown when nobody is signed in.
pub const ANONYMOUS_DISPLAY_NAME: &str = "Not signed in";

pub const DEFAULT_AVATAR: &str = "/default-avatar.png";

/// Field used by `UserStore::users_sorted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSortKey {
    Username,
    Name,
    Email,
    CreatedAt,
    UpdatedAt,
}

#[derive(Debug, Default)]
struct UserState {
    session: Option<Session>,
    users: Vec<User>,
    pagination: Option<Pagination>,
    user_stats: Option<UserStats>,
    loading: bool,
}

pub struct UserStore {
    api: UserApi,
    credentials: Credentials,
    state: RwLock<UserState>,
}

/// Clears `loading` when the call finishes, including when its future is
/// dropped mid-flight.
struct LoadingGuard<'a> {
    state: &'a RwLock<UserState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        sync::write(self.state).loading = false;
    }
}

impl UserStore {
    /// The store shares the client's `Credentials`, so a 401 seen by any
    /// request clears the same durable copy the store writes on login.
    pub fn new(api: UserApi) -> Self {
        let credentials = api.client().credentials().clone();
        Self {
            api,
            credentials,
            state: RwLock::new(UserState::default()),
        }
    }

    pub fn api(&self) -> &UserApi {
        &self.api
    }

    /// Reinstate a session persisted by an earlier process. Returns whether
    /// one was found.
    pub fn restore(&self) -> bool {
        match self.credentials.load_session() {
            Some(session) => {
                debug!(user = %session.user.username, "restored persisted session");
                sync::write(&self.state).session = Some(session);
                true
            }
            None => false,
        }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<Session, ApiError> {
        let result = {
            let _loading = self.begin_loading();
            self.api.login(request).await
        };
        let session = self.observe(result)?;

        self.credentials.save(&session);
        sync::write(&self.state).session = Some(session.clone());
        info!(user = %session.user.username, "signed in");
        Ok(session)
    }

    /// Always leaves the client signed out. The remote error, if any, is
    /// returned after local cleanup.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.api.logout().await;
        if let Err(e) = &result {
            warn!(error = %e, "logout request failed, clearing local session anyway");
        }

        self.credentials.clear();
        {
            let mut state = sync::write(&self.state);
            state.session = None;
            state.users.clear();
            state.pagination = None;
            state.user_stats = None;
        }
        info!("signed out");
        result
    }

    /// Refresh the signed-in user's profile from `GET /user/me`.
    pub async fn fetch_current_user(&self) -> Result<User, ApiError> {
        let result = {
            let _loading = self.begin_loading();
            self.api.current_user().await
        };
        let user = self.observe(result)?;

        let token = self.credentials.token().unwrap_or_default();
        let refresh_token = self.credentials.refresh_token().unwrap_or_default();
        let session = {
            let mut state = sync::write(&self.state);
            let session = state.session.get_or_insert_with(|| Session {
                token,
                refresh_token,
                expires_in: 0,
                user: user.clone(),
            });
            session.user = user.clone();
            session.clone()
        };
        self.credentials.save_session_record(&session);
        Ok(user)
    }

    /// Replace the cached collection with one page from the server.
    pub async fn fetch_users(&self, params: &UserListParams) -> Result<(), ApiError> {
        let result = {
            let _loading = self.begin_loading();
            self.api.list_users(params).await
        };
        let page = self.observe(result)?;

        debug!(count = page.data.len(), page = params.page, "replacing cached users");
        let mut state = sync::write(&self.state);
        state.users = page.data;
        state.pagination = page.pagination;
        Ok(())
    }

    /// Best effort: failures are logged and leave the previous stats.
    pub async fn fetch_user_stats(&self) {
        match self.observe(self.api.user_stats().await) {
            Ok(stats) => sync::write(&self.state).user_stats = Some(stats),
            Err(e) => error!(error = %e, "failed to fetch user statistics"),
        }
    }

    /// Append the created record. No de-duplication.
    pub async fn create(&self, input: &CreateUserRequest) -> Result<User, ApiError> {
        let user = self.observe(self.api.create_user(input).await)?;
        sync::write(&self.state).users.push(user.clone());
        Ok(user)
    }

    pub async fn update(&self, id: &str, input: &UpdateUserRequest) -> Result<User, ApiError> {
        let user = self.observe(self.api.update_user(id, input).await)?;
        self.apply_update(id, &user);
        Ok(user)
    }

    pub async fn update_avatar(&self, id: &str, avatar: &str) -> Result<User, ApiError> {
        let user = self.observe(self.api.update_avatar(id, avatar).await)?;
        self.apply_update(id, &user);
        Ok(user)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.observe(self.api.delete_user(id).await)?;
        sync::write(&self.state).users.retain(|u| u.id != id);
        Ok(())
    }

    pub async fn batch_delete(&self, ids: &[String]) -> Result<(), ApiError> {
        self.observe(self.api.batch_delete_users(ids).await)?;
        sync::write(&self.state).users.retain(|u| !ids.contains(&u.id));
        Ok(())
    }

    /// Drop every in-memory field. Durable storage is left alone.
    pub fn reset(&self) {
        *sync::write(&self.state) = UserState::default();
    }

    pub fn session(&self) -> Option<Session> {
        sync::read(&self.state).session.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        sync::read(&self.state).session.as_ref().map(|s| s.user.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        sync::read(&self.state).session.is_some()
    }

    pub fn is_loading(&self) -> bool {
        sync::read(&self.state).loading
    }

    /// Name, then username, then `ANONYMOUS_DISPLAY_NAME`.
    pub fn display_name(&self) -> String {
        let state = sync::read(&self.state);
        state
            .session
            .as_ref()
            .map(|s| &s.user)
            .and_then(|u| [&u.name, &u.username].into_iter().find(|v| !v.is_empty()).cloned())
            .unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string())
    }

    pub fn avatar(&self) -> String {
        let state = sync::read(&self.state);
        state
            .session
            .as_ref()
            .and_then(|s| s.user.avatar.clone())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_AVATAR.to_string())
    }

    pub fn role(&self) -> Role {
        sync::read(&self.state)
            .session
            .as_ref()
            .map(|s| s.user.role)
            .unwrap_or_default()
    }

    pub fn permissions(&self) -> Vec<String> {
        sync::read(&self.state)
            .session
            .as_ref()
            .map(|s| s.user.permissions.clone())
            .unwrap_or_default()
    }

    /// Pure lookup against the session's permission set.
    pub fn has_permission(&self, code: &str) -> bool {
        sync::read(&self.state)
            .session
            .as_ref()
            .is_some_and(|s| s.user.permissions.iter().any(|p| p == code))
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    pub fn users(&self) -> Vec<User> {
        sync::read(&self.state).users.clone()
    }

    pub fn user_count(&self) -> usize {
        sync::read(&self.state).users.len()
    }

    pub fn active_users(&self) -> Vec<User> {
        sync::read(&self.state)
            .users
            .iter()
            .filter(|u| u.status == UserStatus::Active)
            .cloned()
            .collect()
    }

    /// Cached users ordered by `key`. Ties keep cache order.
    pub fn users_sorted(&self, key: UserSortKey, order: SortOrder) -> Vec<User> {
        let mut users = self.users();
        users.sort_by(|a, b| {
            let ordering = compare(a, b, key);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        users
    }

    pub fn pagination(&self) -> Option<Pagination> {
        sync::read(&self.state).pagination
    }

    pub fn user_stats(&self) -> Option<UserStats> {
        sync::read(&self.state).user_stats
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        sync::write(&self.state).loading = true;
        LoadingGuard { state: &self.state }
    }

    /// Pass `result` through, dropping the in-memory session on 401. The
    /// client has already cleared the durable copy by then.
    fn observe<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if result.as_ref().is_err_and(ApiError::is_auth_expired) {
            sync::write(&self.state).session = None;
        }
        result
    }

    fn apply_update(&self, id: &str, user: &User) {
        let refreshed_session = {
            let mut state = sync::write(&self.state);
            if let Some(slot) = state.users.iter_mut().find(|u| u.id == id) {
                *slot = user.clone();
            }
            match state.session.as_mut() {
                Some(session) if session.user.id == id => {
                    session.user = user.clone();
                    Some(session.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = refreshed_session {
            self.credentials.save_session_record(&session);
        }
    }
}

fn compare(a: &User, b: &User, key: UserSortKey) -> Ordering {
    match key {
        UserSortKey::Username => a.username.cmp(&b.username),
        UserSortKey::Name => a.name.cmp(&b.name),
        UserSortKey::Email => a.email.cmp(&b.email),
        UserSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        UserSortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}
