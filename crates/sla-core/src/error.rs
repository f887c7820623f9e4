use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SlaError {
    #[error("tracker not found: {0}")]
    TrackerNotFound(Uuid),

    #[error("invalid tracker status: {0}")]
    InvalidStatus(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("tracker store error: {0}")]
    Store(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SlaError {
    /// Wrap any displayable storage failure as a `Store` error.
    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SlaError>;
