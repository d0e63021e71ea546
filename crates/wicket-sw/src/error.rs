//! Service worker error types.

use thiserror::Error;

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceWorkerError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InstallFailed(_) => "install",
            Self::Network(_) => "network",
            Self::Cache(_) => "cache",
            Self::Notification(_) => "notification",
            Self::Client(_) => "client",
            Self::State(_) => "state",
            Self::InvalidUrl(_) => "invalid_url",
            Self::NotFound(_) => "not_found",
        }
    }
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Result type alias for service worker operations.
pub type SwResult<T> = Result<T, ServiceWorkerError>;
