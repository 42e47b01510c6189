//! Outbound messages to chat users.

use crate::report::Report;
use crate::{NotifierError, NotifierResult};
use async_trait::async_trait;
use notifier_types::UserId;
use serde::Serialize;
use std::time::Duration;

/// One message sent back in response to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Reply {
    Text(String),
    Report(Report),
}

impl Reply {
    pub fn text(value: impl Into<String>) -> Self {
        Reply::Text(value.into())
    }

    /// Flatten to plain text.
    pub fn render_text(&self) -> String {
        match self {
            Reply::Text(text) => text.clone(),
            Reply::Report(report) => report.render_text(),
        }
    }
}

/// Chat transport.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Push an unsolicited report to a subscriber.
    async fn notify(&self, user_id: &UserId, report: &Report) -> NotifierResult<()>;

    /// Answer a command the user sent.
    async fn reply(&self, user_id: &UserId, reply: &Reply) -> NotifierResult<()>;
}

/// Writes every message to the log. Used when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl DeliveryChannel for LogDelivery {
    async fn notify(&self, user_id: &UserId, report: &Report) -> NotifierResult<()> {
        tracing::info!(
            user = %user_id,
            title = %report.title,
            entries = report.len(),
            "notification"
        );
        Ok(())
    }

    async fn reply(&self, user_id: &UserId, reply: &Reply) -> NotifierResult<()> {
        tracing::info!(user = %user_id, "reply:\n{}", reply.render_text());
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    user_id: &'a str,
    unsolicited: bool,
    #[serde(flatten)]
    message: &'a Reply,
}

/// POSTs each message as JSON to a chat bridge.
///
/// Body: `{"user_id": "...", "unsolicited": bool, "kind": "text"|"report", "content": ...}`.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    http: reqwest::Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> NotifierResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(crate::constants::HTTP_USER_AGENT)
            .build()
            .map_err(|e| NotifierError::DeliveryFailed(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> NotifierResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifierError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::DeliveryFailed(format!(
                "webhook returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for WebhookDelivery {
    async fn notify(&self, user_id: &UserId, report: &Report) -> NotifierResult<()> {
        let message = Reply::Report(report.clone());
        self.post(&WebhookPayload {
            user_id: user_id.as_str(),
            unsolicited: true,
            message: &message,
        })
        .await
    }

    async fn reply(&self, user_id: &UserId, reply: &Reply) -> NotifierResult<()> {
        self.post(&WebhookPayload {
            user_id: user_id.as_str(),
            unsolicited: false,
            message: reply,
        })
        .await
    }
}
