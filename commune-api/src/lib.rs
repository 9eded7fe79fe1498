//! commune-api library - community platform REST service
//!
//! Organizations, communities and their branches, memberships, roles,
//! meeting minutes, donations and a service-provider marketplace, behind
//! passwordless (magic link) authentication.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod maintenance;
pub mod notify;
pub mod pagination;

pub use config::{Args, ServiceConfig};
pub use error::{ApiError, ApiResult};
pub use notify::{HttpNotifier, LogNotifier, Notification, Notifier};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<ServiceConfig>,
    /// HMAC key for session tokens
    pub session_secret: Arc<Vec<u8>>,
    /// Outbound email channel
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: ServiceConfig,
        session_secret: impl Into<Vec<u8>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            session_secret: Arc::new(session_secret.into()),
            notifier,
        }
    }
}

/// Session signing key: configured value, else the stored (or new) one
pub async fn resolve_session_secret(
    db: &SqlitePool,
    config: &ServiceConfig,
) -> commune_common::Result<String> {
    match &config.session_secret {
        Some(secret) => Ok(secret.clone()),
        None => commune_common::db::load_or_create_session_secret(db).await,
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::organization_routes())
        .merge(api::community_routes())
        .merge(api::member_routes())
        .merge(api::role_routes())
        .merge(api::minutes_routes())
        .merge(api::donation_routes())
        .merge(api::marketplace_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
