//! Shared setup for the HTTP-level tests.
//!
//! Every test gets its own flat-file data directory, an in-memory mailer
//! and a cheap password hash so the suite stays fast.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use scholarflow_backend_lib::{
    config::Settings,
    create_router,
    email::{EmailTemplate, MemoryMailer},
    storage::FlatFileStorage,
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "P@ssw0rd!";
pub const ADMIN_PASSWORD: &str = "Adm1n#Strong";

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub mailer: MemoryMailer,
    /// Keep in scope so the data directory outlives the test
    pub dir: TempDir,
}

pub fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.data_dir = dir.path().to_path_buf();
    settings.password_requirements.password_hash_log_n = 4;
    settings.email.background = false;
    settings.rate_limit.max_requests = 1_000;
    settings.frontend_url = "https://scholarflow.example".to_string();
    settings
}

pub fn setup_test_env() -> TestApp {
    let dir = TempDir::new().unwrap();
    setup_in(dir, |_| {})
}

/// Build the app over an existing data directory
pub fn setup_in(dir: TempDir, configure: impl FnOnce(&mut Settings)) -> TestApp {
    let mut settings = test_settings(&dir);
    configure(&mut settings);

    let storage = Arc::new(FlatFileStorage::new(dir.path()).unwrap());
    let mailer = MemoryMailer::new();
    let state = Arc::new(AppState::new(settings, storage, Arc::new(mailer.clone())));
    let app = create_router(Arc::clone(&state));

    TestApp { app, state, mailer, dir }
}

impl TestApp {
    /// Send a request and decode the JSON body (`Null` when empty)
    pub async fn call(&self, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            },
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn post(&self, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, bearer, Some(body)).await
    }

    pub async fn get(&self, uri: &str, bearer: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(bearer), None).await
    }

    /// Register and return the response `data`
    pub async fn register(&self, email: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/auth/register/",
                None,
                json!({ "email": email, "password": PASSWORD, "full_name": "Awa Ndiaye" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    /// `(uid, token)` from the last link of `template` mailed to `to`
    pub fn link(&self, to: &str, template: EmailTemplate) -> (String, String) {
        let email = self.mailer.last_to(to, template).expect("email sent");
        let query = email
            .text
            .split_whitespace()
            .find_map(|w| w.split_once('?').map(|(_, q)| q.to_string()))
            .expect("link in body");

        let mut uid = String::new();
        let mut token = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("uid", v)) => uid = v.to_string(),
                Some(("token", v)) => token = v.to_string(),
                _ => {},
            }
        }
        (uid, token)
    }

    /// Register, follow the verification link and log in; returns the access token
    pub async fn verified_user(&self, email: &str) -> String {
        self.register(email).await;
        let (uid, token) = self.link(email, EmailTemplate::VerifyEmail);
        let (status, _) = self
            .post("/api/auth/email-verify/", None, json!({ "uid": uid, "token": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
        self.login(email, PASSWORD).await["access"].as_str().unwrap().to_string()
    }

    pub async fn admin(&self, email: &str) -> String {
        self.state.auth.create_admin(email, ADMIN_PASSWORD).await.unwrap();
        self.login(email, ADMIN_PASSWORD).await["access"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .post("/api/auth/login/", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }
}
