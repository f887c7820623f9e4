use std::path::PathBuf;

use thiserror::Error;

use crate::payload::NotificationKind;

/// Errors returned by the dispatcher for a single notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("template not found: {kind}/{name}")]
    TemplateNotFound {
        kind: NotificationKind,
        name: String,
    },

    #[error("failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {0} is not valid UTF-8")]
    TemplateEncoding(String),

    #[error("payload kind {payload} does not match {destination} destination")]
    KindMismatch {
        payload: NotificationKind,
        destination: NotificationKind,
    },

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Errors reported by a `Delivery` implementation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("channel not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    /// Whether trying again could help. Missing configuration won't fix itself.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::NotConfigured(_))
    }
}
