//! The registration port and an in-memory registration.
//!
//! ```text
//! Registration
//!     ├── installing (cache version, skip-waiting flag)
//!     ├── waiting    (cache version)
//!     └── active     (cache version)
//! ```
//!
//! The hosting runtime drives install and activate timing; the worker only
//! asks it to skip the waiting phase.

use crate::error::SwResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Installing {
    cache_version: String,
    skip_waiting: bool,
}

/// Which worker versions a registration holds, named by cache version.
#[derive(Debug, Default)]
pub struct Registration {
    installing: Option<Installing>,
    waiting: Option<String>,
    active: Option<String>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start installing a new version, replacing any install in progress.
    pub fn begin_install(&mut self, cache_version: &str) {
        self.installing = Some(Installing {
            cache_version: cache_version.to_string(),
            skip_waiting: false,
        });
    }

    /// Move the installing version to waiting, or straight to active when it
    /// asked to skip waiting.
    pub fn install_complete(&mut self) {
        if let Some(installed) = self.installing.take() {
            self.waiting = Some(installed.cache_version);
            if installed.skip_waiting {
                self.activate();
            }
        }
    }

    /// Promote the waiting version.
    pub fn activate(&mut self) {
        if let Some(version) = self.waiting.take() {
            info!(cache_version = %version, "Worker activated");
            self.active = Some(version);
        }
    }

    /// Activate a waiting version now, or flag the installing one so it
    /// activates as soon as it is installed.
    pub fn skip_waiting(&mut self) {
        if self.waiting.is_some() {
            self.activate();
        } else if let Some(installing) = self.installing.as_mut() {
            debug!(cache_version = %installing.cache_version, "Skip waiting requested during install");
            installing.skip_waiting = true;
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn waiting(&self) -> Option<&str> {
        self.waiting.as_deref()
    }

    /// Whether the installing version will skip the waiting phase.
    pub fn skip_waiting_flagged(&self) -> bool {
        self.installing.as_ref().map_or(false, |i| i.skip_waiting)
    }
}

/// Requests the worker can make of its own registration.
#[async_trait]
pub trait RegistrationPort: Send + Sync {
    /// Activate without waiting for old pages to close.
    async fn skip_waiting(&self) -> SwResult<()>;
}

/// In-process registration.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistration {
    inner: Arc<RwLock<Registration>>,
}

impl MemoryRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin_install(&self, cache_version: &str) {
        self.inner.write().await.begin_install(cache_version);
    }

    pub async fn install_complete(&self) {
        self.inner.write().await.install_complete();
    }

    pub async fn activate(&self) {
        self.inner.write().await.activate();
    }

    /// Cache version of the active worker.
    pub async fn active_version(&self) -> Option<String> {
        self.inner.read().await.active().map(str::to_string)
    }

    pub async fn has_waiting(&self) -> bool {
        self.inner.read().await.waiting().is_some()
    }

    pub async fn skip_waiting_flagged(&self) -> bool {
        self.inner.read().await.skip_waiting_flagged()
    }
}

#[async_trait]
impl RegistrationPort for MemoryRegistration {
    async fn skip_waiting(&self) -> SwResult<()> {
        self.inner.write().await.skip_waiting();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = Registration::new();
        registration.begin_install("v1");

        registration.install_complete();
        assert_eq!(registration.waiting(), Some("v1"));
        assert!(registration.active().is_none());

        registration.activate();
        assert_eq!(registration.active(), Some("v1"));
        assert!(registration.waiting().is_none());
    }

    #[test]
    fn test_skip_waiting_during_install() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        registration.install_complete();
        registration.activate();

        registration.begin_install("v2");
        registration.skip_waiting();
        assert!(registration.skip_waiting_flagged());
        assert_eq!(registration.active(), Some("v1"));

        registration.install_complete();
        assert!(registration.waiting().is_none());
        assert_eq!(registration.active(), Some("v2"));
    }

    #[test]
    fn test_skip_waiting_with_waiting_version() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        registration.install_complete();

        registration.skip_waiting();
        assert_eq!(registration.active(), Some("v1"));
        assert!(!registration.skip_waiting_flagged());
    }

    #[test]
    fn test_skip_waiting_with_nothing_pending_is_noop() {
        let mut registration = Registration::new();
        registration.skip_waiting();
        assert!(registration.active().is_none());
        assert!(!registration.skip_waiting_flagged());
    }

    #[tokio::test]
    async fn test_memory_registration_port() {
        let registration = MemoryRegistration::new();
        registration.begin_install("cricket-live-v2").await;
        registration.skip_waiting().await.unwrap();
        assert!(registration.skip_waiting_flagged().await);

        registration.install_complete().await;
        assert!(!registration.has_waiting().await);
        assert_eq!(
            registration.active_version().await.as_deref(),
            Some("cricket-live-v2")
        );
    }
}
