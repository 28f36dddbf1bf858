use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Router,
};
use scholarflow_common::{LoginRequest, RegisterRequest};
use tower::ServiceExt;

use super::*;
use crate::config::Settings;
use crate::email::MemoryMailer;
use crate::storage::MemoryStorage;
use crate::AppState;

fn state_with(configure: impl FnOnce(&mut Settings)) -> Arc<AppState> {
    let mut settings = Settings::default();
    settings.password_requirements.password_hash_log_n = 4;
    settings.email.background = false;
    configure(&mut settings);
    Arc::new(AppState::new(
        settings,
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryMailer::new()),
    ))
}

fn guarded_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/me", get(|user: CurrentUser| async move { user.account.email }))
        .route("/active", get(|ActiveUser(user): ActiveUser| async move { user.account.email }))
        .route("/admin", get(|AdminUser(user): AdminUser| async move { user.account.email }))
        .with_state(state)
}

async fn get_with(app: &Router, uri: &str, bearer: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
}

async fn error_code(response: Response) -> String {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["code"].as_str().unwrap_or_default().to_string()
}

async fn register(state: &AppState, email: &str) -> String {
    let response = state
        .auth
        .register(RegisterRequest {
            email: email.to_string(),
            password: "P@ssw0rd!".to_string(),
            phone_number: None,
            full_name: Some("Awa Ndiaye".to_string()),
            role: None,
        })
        .await
        .unwrap();
    response.tokens.access
}

#[test]
fn test_rate_limiter_window() {
    let limiter = RateLimiter::new(Duration::from_secs(60), 2);
    assert!(limiter.check("10.0.0.1").is_ok());
    assert!(limiter.check("10.0.0.1").is_ok());

    let retry = limiter.check("10.0.0.1").unwrap_err();
    assert!(retry >= 1 && retry <= 60);

    // Other clients have their own window
    assert!(limiter.check("10.0.0.2").is_ok());
}

#[test]
fn test_rate_limiter_cleanup_keeps_live_windows() {
    let limiter = RateLimiter::new(Duration::from_secs(60), 1);
    assert!(limiter.check("10.0.0.1").is_ok());
    limiter.cleanup();
    assert!(limiter.check("10.0.0.1").is_err());
}

fn limited_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit))
        .with_state(state)
}

async fn send_from(app: &Router, peer: [u8; 4], forwarded_for: Option<&str>) -> Response {
    let mut request = Request::builder()
        .uri("/")
        .extension(ConnectInfo(SocketAddr::from((peer, 4000))));
    if let Some(ip) = forwarded_for {
        request = request.header("x-forwarded-for", ip);
    }
    app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_rate_limit_middleware() {
    let app = limited_router(state_with(|s| s.rate_limit.max_requests = 2));

    assert_eq!(send_from(&app, [127, 0, 0, 1], None).await.status(), StatusCode::OK);
    assert_eq!(send_from(&app, [127, 0, 0, 1], None).await.status(), StatusCode::OK);

    let limited = send_from(&app, [127, 0, 0, 1], None).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(error_code(limited).await, "RATE_001");

    assert_eq!(send_from(&app, [127, 0, 0, 2], None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_header_ignored_by_default() {
    let app = limited_router(state_with(|s| s.rate_limit.max_requests = 2));

    let peer = [203, 0, 113, 9];
    assert_eq!(send_from(&app, peer, Some("10.0.0.1")).await.status(), StatusCode::OK);
    assert_eq!(send_from(&app, peer, Some("10.0.0.2")).await.status(), StatusCode::OK);
    assert_eq!(
        send_from(&app, peer, Some("10.0.0.3")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_forwarded_for_header_used_when_trusted() {
    let app = limited_router(state_with(|s| {
        s.rate_limit.max_requests = 1;
        s.rate_limit.trust_proxy_headers = true;
    }));

    // One proxy peer, distinct clients behind it
    let proxy = [10, 0, 0, 254];
    assert_eq!(send_from(&app, proxy, Some("198.51.100.1")).await.status(), StatusCode::OK);
    assert_eq!(send_from(&app, proxy, Some("198.51.100.2, 10.0.0.254")).await.status(), StatusCode::OK);
    assert_eq!(
        send_from(&app, proxy, Some("198.51.100.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_missing_or_malformed_bearer_is_unauthenticated() {
    let app = guarded_router(state_with(|_| {}));

    let response = get_with(&app, "/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "AUTH_004");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with(&app, "/me", Some("not-a-jwt")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "TOK_003");
}

#[tokio::test]
async fn test_pending_account_only_reaches_current_user_routes() {
    let state = state_with(|_| {});
    let access = register(&state, "pending@x.com").await;
    let app = guarded_router(state);

    assert_eq!(get_with(&app, "/me", Some(&access)).await.status(), StatusCode::OK);

    let response = get_with(&app, "/active", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "AUTH_002");
}

#[tokio::test]
async fn test_admin_gate() {
    let state = state_with(|_| {});
    let access = register(&state, "learner@x.com").await;
    let learner = state.accounts.find_by_email("learner@x.com").await.unwrap();
    state.auth.set_account_active(learner.id, true).await.unwrap();

    state.auth.create_admin("admin@x.com", "Adm1n#Strong").await.unwrap();
    let admin_access = state
        .auth
        .login(LoginRequest {
            email: "admin@x.com".to_string(),
            password: "Adm1n#Strong".to_string(),
        })
        .await
        .unwrap()
        .access;

    let app = guarded_router(state);

    assert_eq!(get_with(&app, "/active", Some(&access)).await.status(), StatusCode::OK);
    let response = get_with(&app, "/admin", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "AUTH_005");

    assert_eq!(get_with(&app, "/admin", Some(&admin_access)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_token_is_not_a_bearer() {
    let state = state_with(|_| {});
    let response = state
        .auth
        .register(RegisterRequest {
            email: "rt@x.com".to_string(),
            password: "P@ssw0rd!".to_string(),
            phone_number: None,
            full_name: None,
            role: None,
        })
        .await
        .unwrap();
    let app = guarded_router(state);

    let response = get_with(&app, "/me", Some(&response.tokens.refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
