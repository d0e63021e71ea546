//! # Wicket Common
//!
//! Shared error types, logging setup, and configuration file helpers for the
//! Wicket service worker crates.
//!
//! ## Features
//!
//! - Unified error type for configuration and I/O failures
//! - Logging configuration and setup
//! - JSON configuration loading
//! - Result extension trait

use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for Wicket support code.
#[derive(Error, Debug)]
pub enum WicketError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Logging could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decode errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WicketError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            WicketError::Config { .. } => "config",
            WicketError::Logging(_) => "logging",
            WicketError::Io(_) => "io",
            WicketError::Json(_) => "json",
            WicketError::NotFound(_) => "not_found",
            WicketError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for Wicket support operations.
pub type Result<T> = std::result::Result<T, WicketError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap the error as a config error with a message.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| WicketError::config_with_source(message, e))
    }
}

/// Read and decode a JSON document from disk.
pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(WicketError::NotFound(path.display().to_string()));
    }
    debug!(path = %path.display(), "Reading JSON file");
    let raw = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&raw)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_error_categories() {
        assert_eq!(WicketError::config("bad").category(), "config");
        assert_eq!(WicketError::NotFound("x".into()).category(), "not_found");
        assert_eq!(
            WicketError::InvalidArgument("x".into()).category(),
            "invalid_argument"
        );
    }

    #[test]
    fn test_result_context() {
        let parsed: std::result::Result<u8, _> = "nope".parse::<u8>();
        let err = parsed.context("reminder delay").unwrap_err();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("reminder delay"));
    }

    #[test]
    fn test_read_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"name\": \"v1\"}}").unwrap();

        let value: serde_json::Value = read_json_file(file.path()).unwrap();
        assert_eq!(value["name"], "v1");
    }

    #[test]
    fn test_read_json_file_missing() {
        let result: Result<serde_json::Value> =
            read_json_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(WicketError::NotFound(_))));
    }

    #[test]
    fn test_read_json_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let result: Result<serde_json::Value> = read_json_file(file.path());
        assert!(matches!(result, Err(WicketError::Json(_))));
    }
}
