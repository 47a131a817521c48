use axum::{
    http::{self, Request, StatusCode},
    response::Response,
    routing::RouterIntoService,
};
use http_body_util::BodyExt;
use mock_server::{app, Availability, Deleted, Envelope, Page, Session, Stats, User, ADMIN_PASSWORD, ADMIN_USERNAME};
use serde::de::DeserializeOwned;
use tower::{Service, ServiceExt};

async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<String> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.to_string()).unwrap()
}

fn get(uri: &str, token: &str) -> Request<String> {
    json_request("GET", uri, Some(token), "")
}

async fn send(app: &mut RouterIntoService<String>, request: Request<String>) -> Response {
    ServiceExt::ready(app).await.unwrap().call(request).await.unwrap()
}

async fn data<T: DeserializeOwned>(response: Response) -> T {
    assert_eq!(response.status(), StatusCode::OK);
    let envelope: Envelope<T> = body_json(response).await;
    assert_eq!(envelope.code, 200, "{}", envelope.message);
    envelope.data.unwrap()
}

async fn succeeds(response: Response) {
    assert_eq!(response.status(), StatusCode::OK);
    let envelope: Envelope<serde_json::Value> = body_json(response).await;
    assert_eq!(envelope.code, 200, "{}", envelope.message);
}

async fn login(app: &mut RouterIntoService<String>) -> String {
    let body = format!(r#"{{"username":"{ADMIN_USERNAME}","password":"{ADMIN_PASSWORD}"}}"#);
    let session: Session = data(send(app, json_request("POST", "/api/auth/login", None, &body)).await).await;
    session.token
}

async fn create(app: &mut RouterIntoService<String>, token: &str, username: &str) -> User {
    let body = format!(
        r#"{{"username":"{username}","email":"{username}@example.com","name":"{username}","password":"secret123"}}"#
    );
    data(send(app, json_request("POST", "/api/users", Some(token), &body)).await).await
}

// --- auth ---

#[tokio::test]
async fn login_returns_session_for_seeded_admin() {
    let body = format!(r#"{{"username":"{ADMIN_USERNAME}","password":"{ADMIN_PASSWORD}"}}"#);
    let resp = app()
        .oneshot(json_request("POST", "/api/auth/login", None, &body))
        .await
        .unwrap();

    let session: Session = data(resp).await;
    assert!(!session.token.is_empty());
    assert!(!session.refresh_token.is_empty());
    assert_eq!(session.user.username, ADMIN_USERNAME);
    assert!(session.user.permissions.contains(&"user:view".to_string()));
}

#[tokio::test]
async fn bad_credentials_are_a_business_failure() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            r#"{"username":"admin","password":"wrong"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let envelope: Envelope<serde_json::Value> = body_json(resp).await;
    assert_eq!(envelope.code, 400);
    assert_eq!(envelope.message, "invalid username or password");
    assert!(envelope.data.is_none());
}

#[tokio::test]
async fn missing_token_is_401_with_envelope() {
    let resp = app()
        .oneshot(json_request("GET", "/api/users", None, ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let envelope: Envelope<serde_json::Value> = body_json(resp).await;
    assert_eq!(envelope.code, 401);
}

#[tokio::test]
async fn unknown_token_is_401() {
    let resp = app().oneshot(get("/api/user/me", "forged")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let mut app = app().into_service();
    let token = login(&mut app).await;

    let me: User = data(send(&mut app, get("/api/user/me", &token)).await).await;
    assert_eq!(me.username, ADMIN_USERNAME);

    succeeds(send(&mut app, json_request("POST", "/api/auth/logout", Some(&token), "")).await).await;
    let resp = send(&mut app, get("/api/user/me", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- users ---

#[tokio::test]
async fn duplicate_username_is_a_business_failure() {
    let mut app = app().into_service();
    let token = login(&mut app).await;
    create(&mut app, &token, "alice").await;

    let resp = send(
        &mut app,
        json_request(
            "POST",
            "/api/users",
            Some(&token),
            r#"{"username":"alice","email":"other@example.com","name":"A","password":"secret123"}"#,
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let envelope: Envelope<serde_json::Value> = body_json(resp).await;
    assert_eq!(envelope.code, 409);
}

#[tokio::test]
async fn list_paginates_and_filters() {
    let mut app = app().into_service();
    let token = login(&mut app).await;
    for name in ["bob", "carol", "dave"] {
        create(&mut app, &token, name).await;
    }

    let page: Page = data(send(&mut app, get("/api/users?page=2&pageSize=3", &token)).await).await;
    assert_eq!(page.pagination.total, 4);
    assert_eq!(page.pagination.total_pages, 2);
    assert_eq!(page.data.len(), 1);

    let page: Page = data(send(&mut app, get("/api/users?username=CAR", &token)).await).await;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].username, "carol");

    let page: Page = data(send(&mut app, get("/api/users?sortBy=username&sortOrder=desc", &token)).await).await;
    let names: Vec<&str> = page.data.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["dave", "carol", "bob", "admin"]);
}

#[tokio::test]
async fn user_lifecycle() {
    let mut app = app().into_service();
    let token = login(&mut app).await;

    // create
    let created = create(&mut app, &token, "erin").await;
    assert_eq!(created.permissions, vec!["user:view".to_string()]);
    let id = created.id.clone();

    // availability
    let check: Availability = data(send(&mut app, get("/api/users/check-username/erin", &token)).await).await;
    assert!(!check.available);
    let check: Availability = data(send(&mut app, get("/api/users/check-email/new%40example.com", &token)).await).await;
    assert!(check.available);

    // update, partial
    let updated: User = data(
        send(
            &mut app,
            json_request("PUT", &format!("/api/users/{id}"), Some(&token), r#"{"status":"banned"}"#),
        )
        .await,
    )
    .await;
    assert_eq!(updated.name, "erin");
    assert_eq!(updated.status, mock_server::UserStatus::Banned);

    // password and avatar
    succeeds(
        send(
            &mut app,
            json_request("PUT", &format!("/api/users/{id}/password"), Some(&token), r#"{"password":"n3wsecret"}"#),
        )
        .await,
    )
    .await;
    let with_avatar: User = data(
        send(
            &mut app,
            json_request("PUT", &format!("/api/users/{id}/avatar"), Some(&token), r#"{"avatar":"/a.png"}"#),
        )
        .await,
    )
    .await;
    assert_eq!(with_avatar.avatar.as_deref(), Some("/a.png"));

    // stats
    let stats: Stats = data(send(&mut app, get("/api/users/stats", &token)).await).await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.banned, 1);
    assert_eq!(stats.admin, 1);

    // delete
    succeeds(send(&mut app, json_request("DELETE", &format!("/api/users/{id}"), Some(&token), "")).await).await;
    let resp = send(&mut app, get(&format!("/api/users/{id}"), &token)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let envelope: Envelope<serde_json::Value> = body_json(resp).await;
    assert_eq!(envelope.code, 404);
}

#[tokio::test]
async fn batch_delete_skips_unknown_ids() {
    let mut app = app().into_service();
    let token = login(&mut app).await;
    let a = create(&mut app, &token, "frank").await;
    let b = create(&mut app, &token, "grace").await;

    let body = format!(r#"{{"ids":["{}","{}","missing"]}}"#, a.id, b.id);
    let deleted: Deleted = data(send(&mut app, json_request("DELETE", "/api/users/batch", Some(&token), &body)).await).await;

    assert_eq!(deleted.deleted, 2);
    let page: Page = data(send(&mut app, get("/api/users", &token)).await).await;
    assert_eq!(page.data.len(), 1);
}

#[tokio::test]
async fn updating_a_missing_user_is_404() {
    let mut app = app().into_service();
    let token = login(&mut app).await;
    let resp = send(
        &mut app,
        json_request("PUT", "/api/users/nope", Some(&token), r#"{"name":"x"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
