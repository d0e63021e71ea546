//! Worker configuration

use crate::error::SwResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use wicket_common::{ResultExt, WicketError};

/// Service worker configuration.
///
/// The cache version must change whenever the precache list changes so that
/// activation evicts the previous bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Name of the current cache bucket
    pub cache_version: String,

    /// Origin the application is served from
    pub origin: String,

    /// Assets stored at install time, relative to the origin or absolute
    pub precache: Vec<String>,

    /// Hosts whose responses are always fetched network-first
    pub dynamic_hosts: Vec<String>,

    /// Path fragment marking API requests
    pub api_marker: String,

    /// Delay for the "remind" action in milliseconds
    pub reminder_delay_ms: u64,

    /// Defaults for push notifications
    pub notification: NotificationDefaults,

    /// Reminder notification text
    pub reminder: ReminderTemplate,

    /// Background sync tag that refreshes match data
    pub sync_tag: String,

    /// Endpoint fetched on background sync
    pub sync_endpoint: String,

    /// Logical cache key the synced match list is stored under
    pub sync_cache_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,

    /// Page opened when a notification carries no URL
    pub url: String,

    /// Tag used when a push names no match
    pub generic_tag: String,

    /// Prefix for per-match tags
    pub match_tag_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReminderTemplate {
    pub title: String,
    pub body: String,
    pub tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_version: "cricket-live-v1".to_string(),
            origin: "https://wicket.live".to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
            ],
            dynamic_hosts: vec!["api.cricapi.com".to_string()],
            api_marker: "/api/".to_string(),
            reminder_delay_ms: 5 * 60 * 1000,
            notification: NotificationDefaults::default(),
            reminder: ReminderTemplate::default(),
            sync_tag: "background-sync-matches".to_string(),
            sync_endpoint: "https://api.cricapi.com/v1/currentMatches".to_string(),
            sync_cache_key: "/offline/matches.json".to_string(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Cricket Live".to_string(),
            body: "New match update available!".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            url: "/".to_string(),
            generic_tag: "cricket-notification".to_string(),
            match_tag_prefix: "cricket-match-".to_string(),
        }
    }
}

impl Default for ReminderTemplate {
    fn default() -> Self {
        Self {
            title: "Match Reminder".to_string(),
            body: "Don't forget to check the live match!".to_string(),
            tag: "cricket-reminder".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> wicket_common::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid worker config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> wicket_common::Result<Self> {
        let loaded = wicket_common::read_json_file::<Self>(path).and_then(|config| {
            config.validate()?;
            Ok(config)
        });
        match loaded {
            Ok(config) => {
                debug!(path = %path.display(), cache_version = %config.cache_version, "Loaded worker config");
                Ok(config)
            }
            Err(err) => {
                warn!(path = %path.display(), category = err.category(), error = %err, "Could not load worker config");
                Err(err)
            }
        }
    }

    /// Check invariants the handlers rely on.
    pub fn validate(&self) -> wicket_common::Result<()> {
        if self.cache_version.trim().is_empty() {
            return Err(WicketError::config("cacheVersion must not be empty"));
        }
        if self.api_marker.is_empty() {
            return Err(WicketError::config("apiMarker must not be empty"));
        }
        if let Some(host) = self.dynamic_hosts.iter().find(|h| h.trim().is_empty()) {
            return Err(WicketError::InvalidArgument(format!(
                "dynamicHosts contains a blank entry {:?}",
                host
            )));
        }
        Url::parse(&self.origin).context(format!("origin {:?} is not a URL", self.origin))?;
        Ok(())
    }

    /// Parsed application origin.
    pub fn origin_url(&self) -> SwResult<Url> {
        Ok(Url::parse(&self.origin)?)
    }

    /// Resolve a possibly relative URL against the origin.
    pub fn resolve(&self, url: &str) -> SwResult<Url> {
        Ok(self.origin_url()?.join(url)?)
    }

    pub fn reminder_delay(&self) -> Duration {
        Duration::from_millis(self.reminder_delay_ms)
    }
}
