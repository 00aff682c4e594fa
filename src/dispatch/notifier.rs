use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::router::Destination;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Classification tag, absent for verbatim price-level relays.
    pub tag: Option<String>,
    pub content: String,
}

/// Best-effort delivery of one rendered message. Implementations make a
/// single attempt; callers own timeouts and never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &Destination, message: &OutboundMessage)
        -> Result<(), AppError>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts `{"content": ...}` to a chat webhook URL (Discord-compatible).
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), AppError> {
        let resp = self
            .http
            .post(&destination.url)
            .json(&WebhookPayload {
                content: &message.content,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(AppError::DispatchStatus {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}
