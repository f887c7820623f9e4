//! Delivery channels.
//!
//! A `Delivery` takes a rendered notification and reports whether it went
//! out. Wire details beyond "POST this body" are the channel's concern.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::payload::{Destination, RenderedNotification};

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Short channel name for logs.
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: &RenderedNotification) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// LogDelivery
// ---------------------------------------------------------------------------

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, message: &RenderedNotification) -> Result<(), DeliveryError> {
        match &message.destination {
            Destination::Email { to, subject } => {
                info!(to = %to, subject = %subject, bytes = message.body.len(), "email (dry run)");
            }
            Destination::Teams { webhook_url } => {
                info!(webhook_url = %webhook_url, bytes = message.body.len(), "teams webhook (dry run)");
            }
        }
        debug!(body = %message.body, "rendered notification");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HttpDelivery
// ---------------------------------------------------------------------------

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct EmailRelayRequest<'a> {
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts Teams cards straight to their webhook and emails to an HTTP relay.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    email_relay_url: Option<String>,
}

impl HttpDelivery {
    pub fn new(email_relay_url: Option<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            email_relay_url,
        })
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<(), DeliveryError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, message: &RenderedNotification) -> Result<(), DeliveryError> {
        match &message.destination {
            Destination::Teams { webhook_url } => {
                let request = self
                    .client
                    .post(webhook_url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(message.body.clone());
                self.post(request).await
            }
            Destination::Email { to, subject } => {
                let relay = self.email_relay_url.as_deref().ok_or_else(|| {
                    DeliveryError::NotConfigured("email relay URL is not set".into())
                })?;
                let request = self.client.post(relay).json(&EmailRelayRequest {
                    to,
                    subject,
                    html: &message.body,
                });
                self.post(request).await
            }
        }
    }
}
