//! Outbound notifications (magic links, membership updates)
//!
//! Delivery is delegated to an external mail service. Without one configured,
//! notifications are written to the log so a developer can follow the link.

use axum::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Notification delivery failure
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier unreachable: {0}")]
    Network(String),

    #[error("Notifier rejected message: HTTP {0}")]
    Rejected(u16),
}

/// A single message for one recipient
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    /// Template name understood by the mail service
    pub template: String,
    pub data: Value,
}

impl Notification {
    pub fn magic_link(to: &str, name: Option<&str>, link: &str, ttl_minutes: i64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your sign-in link".to_string(),
            template: "magic_link".to_string(),
            data: json!({
                "name": name,
                "link": link,
                "expires_in_minutes": ttl_minutes,
            }),
        }
    }

    pub fn membership_status(to: &str, community_name: &str, status: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Your membership in {}", community_name),
            template: "membership_status".to_string(),
            data: json!({
                "community": community_name,
                "status": status,
            }),
        }
    }
}

/// Delivery channel for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Posts notifications to `{base_url}/send`
pub struct HttpNotifier {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("commune-api/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/send", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        debug!(template = %notification.template, endpoint = %self.endpoint, "Sending notification");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Development channel: logs the notification instead of sending it
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            to = %notification.to,
            template = %notification.template,
            data = %notification.data,
            "Notification (no notifier configured)"
        );
        Ok(())
    }
}
