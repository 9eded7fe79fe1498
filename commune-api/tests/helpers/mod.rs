//! Shared helpers for commune-api integration tests
//!
//! Each test gets a fresh temp-file database and a recording notifier, so
//! magic links can be read back instead of emailed.

#![allow(dead_code)]

use axum::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use commune_api::notify::NotifyError;
use commune_api::{build_router, AppState, Notification, Notifier, ServiceConfig};
use commune_common::db::init_database;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const SUPER_ADMIN_EMAIL: &str = "root@example.org";

/// Notifier that keeps every notification in memory
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Token from the newest magic link sent to `email`
    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|n| n.to == email && n.template == "magic_link")
            .and_then(|n| n.data["link"].as_str().map(str::to_string))
            .and_then(|link| link.split_once("token=").map(|(_, t)| t.to_string()))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// A signed-in test member
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub member_id: Uuid,
}

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Should create temp dir");
        let db_path = dir.path().join("commune.db");
        let db = init_database(&db_path).await.expect("Should init database");

        let mut config = ServiceConfig::for_database(db_path);
        config.super_admin_emails = vec![SUPER_ADMIN_EMAIL.to_string()];

        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(db.clone(), config, TEST_SECRET, notifier.clone());

        Self {
            router: build_router(state),
            db,
            notifier,
            _dir: dir,
        }
    }

    /// Send a request; returns status, headers-free JSON body (`Null` when empty)
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.raw_request(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        (status, json)
    }

    pub async fn raw_request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request("DELETE", uri, token, None).await
    }

    /// POST a raw (possibly malformed) JSON body
    pub async fn post_raw(&self, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
    }

    /// Request a magic link for `email` and return the emailed token
    pub async fn request_link(&self, email: &str) -> String {
        let (status, _) = self
            .post("/api/auth/magic-link", None, json!({ "email": email, "name": name_for(email) }))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        self.notifier
            .last_token_for(email)
            .expect("Magic link should have been sent")
    }

    /// Full sign-in flow for `email`
    pub async fn login(&self, email: &str) -> Session {
        let link_token = self.request_link(email).await;
        let (status, body) = self
            .post("/api/auth/verify", None, json!({ "token": link_token }))
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {}", body);

        Session {
            token: body["token"].as_str().unwrap().to_string(),
            member_id: body["member"]["id"].as_str().unwrap().parse().unwrap(),
        }
    }

    pub async fn login_super_admin(&self) -> Session {
        self.login(SUPER_ADMIN_EMAIL).await
    }

    /// Organization created by a super admin
    pub async fn create_organization(&self, admin: &Session, name: &str) -> Uuid {
        let (status, body) = self
            .post(
                "/api/organizations",
                Some(&admin.token),
                json!({ "name": name, "description": "Test organization" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create organization failed: {}", body);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Community created by `founder`, who becomes its admin
    pub async fn create_community(
        &self,
        founder: &Session,
        organization_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
        requires_approval: bool,
    ) -> Uuid {
        let (status, body) = self
            .post(
                "/api/communities",
                Some(&founder.token),
                json!({
                    "organization_id": organization_id,
                    "name": name,
                    "parent_id": parent_id,
                    "requires_approval": requires_approval,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create community failed: {}", body);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Join a community; returns the resulting membership status
    pub async fn join(&self, member: &Session, community_id: Uuid) -> String {
        let (status, body) = self
            .post(
                &format!("/api/communities/{}/join", community_id),
                Some(&member.token),
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "join failed: {}", body);
        body["status"].as_str().unwrap().to_string()
    }
}

/// Display name derived from the local part of an email
fn name_for(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    let mut chars = local.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
