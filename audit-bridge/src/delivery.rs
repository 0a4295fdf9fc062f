use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::model::TargetAuditEvent;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code {status} with body: {body}")]
    Status { status: StatusCode, body: String },
}

impl DeliveryError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            DeliveryError::Transport(err) => err.status(),
        }
    }
}

/// Downstream receiver of converted audit events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &TargetAuditEvent) -> Result<(), DeliveryError>;
}

/// POSTs each event as JSON to Falco's k8s-audit webhook.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn deliver(&self, event: &TargetAuditEvent) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        // Anything below 400 counts, redirects included.
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        debug!(audit_id = %event.audit_id, %status, "delivered audit event");
        Ok(())
    }
}
