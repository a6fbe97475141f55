//! Best-effort notifications to a Slack incoming webhook
//!
//! Delivery failures are logged and swallowed; a notification never fails
//! a reconciliation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ScalingError};

/// Color tag of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Alert,
}

impl Severity {
    /// Attachment color understood by Slack
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Info => "#3AA3E3",
            Severity::Alert => "#FF0000",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Alert,
        }
    }
}

/// Fire-and-forget message sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    attachments: [SlackAttachment<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SlackAttachment<'a> {
    text: String,
    color: &'a str,
}

/// Posts attachments to a Slack incoming webhook
pub struct SlackNotifier {
    client: Client,
    webhook: Url,
    /// Shown in bold in front of every message, usually the host name
    source: String,
}

impl SlackNotifier {
    pub fn new(webhook: &str, source: impl Into<String>) -> Result<Self> {
        let webhook = Url::parse(webhook)
            .map_err(|e| ScalingError::Configuration(format!("invalid webhook URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ScalingError::Notification(e.to_string()))?;

        Ok(Self {
            client,
            webhook,
            source: source.into(),
        })
    }

    fn payload<'a>(&self, notification: &'a Notification) -> SlackPayload<'a> {
        SlackPayload {
            attachments: [SlackAttachment {
                text: format!("*{}*: {}", self.source.to_uppercase(), notification.text),
                color: notification.severity.color(),
            }],
        }
    }

    /// Deliver one notification, reporting failures to the caller
    pub async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(self.webhook.clone())
            .json(&self.payload(notification))
            .send()
            .await
            .map_err(|e| ScalingError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScalingError::Notification(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }

        debug!(severity = ?notification.severity, "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, notification: &Notification) {
        if let Err(e) = self.send(notification).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}
