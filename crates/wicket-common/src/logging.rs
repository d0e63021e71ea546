//! Logging setup for hosts of the worker.

use crate::{Result, WicketError};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when neither `filter` nor `RUST_LOG` is set.
    pub level: Level,
    pub format: LogFormat,
    /// Filter directives, e.g. "wicket_sw=debug". Overrides `RUST_LOG`.
    pub filter: Option<String>,
    /// Route output through the test harness capture.
    pub test_writer: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            filter: None,
            test_writer: false,
        }
    }
}

impl LogConfig {
    /// Quiet unless `RUST_LOG` asks otherwise, captured per test.
    pub fn for_tests() -> Self {
        Self {
            level: Level::WARN,
            test_writer: true,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.to_string());
        match self.filter {
            Some(ref custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if one is already installed. Hosts usually ignore that error,
/// since the earlier subscriber keeps receiving events.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let layer = match (config.format, config.test_writer) {
        (LogFormat::Pretty, false) => fmt::layer().with_target(true).boxed(),
        (LogFormat::Pretty, true) => fmt::layer().with_target(true).with_test_writer().boxed(),
        (LogFormat::Json, false) => fmt::layer().json().boxed(),
        (LogFormat::Json, true) => fmt::layer().json().with_test_writer().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()
        .map_err(|e| WicketError::Logging(e.to_string()))
}
