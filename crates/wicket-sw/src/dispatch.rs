//! Lifecycle events, effects, and the pure planners that map one to the other.
//!
//! Planners never touch a port. They see the event plus whatever snapshot the
//! worker gathered (cache names, open windows) and return the effects to
//! apply, in order.

use crate::cache::CacheEntry;
use crate::clients::{Client, ClientMessage};
use crate::config::WorkerConfig;
use crate::http::Request;
use crate::notification::{
    NotificationDescriptor, ACTION_DISMISS, ACTION_REMIND, ACTION_WATCH,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Events delivered by the hosting runtime.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    Push { data: Option<Vec<u8>> },
    NotificationClick(NotificationClick),
    NotificationClose { tag: String },
    Sync { tag: String },
    Message(JsonValue),
    Error { message: String },
    UnhandledRejection { reason: String },
}

impl LifecycleEvent {
    /// Event name as used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
            Self::Push { .. } => "push",
            Self::NotificationClick(_) => "notificationclick",
            Self::NotificationClose { .. } => "notificationclose",
            Self::Sync { .. } => "sync",
            Self::Message(_) => "message",
            Self::Error { .. } => "error",
            Self::UnhandledRejection { .. } => "unhandledrejection",
        }
    }
}

/// A click on a notification or one of its action buttons.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    /// Action id, or None when the body was clicked.
    pub action: Option<String>,
    pub notification: NotificationDescriptor,
}

impl NotificationClick {
    pub fn new(action: Option<&str>, notification: NotificationDescriptor) -> Self {
        Self {
            action: action.filter(|a| !a.is_empty()).map(str::to_string),
            notification,
        }
    }
}

/// Messages a page may post to the worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WorkerMessage {
    SkipWaiting,
    ScheduleNotification {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        body: Option<String>,
        /// Milliseconds. Null, missing, or non-numeric means no delay.
        #[serde(default, deserialize_with = "lenient_millis")]
        delay: Option<f64>,
        #[serde(default, rename = "matchData")]
        match_data: Option<JsonValue>,
    },
}

impl WorkerMessage {
    /// Decode a page message. Unknown or malformed messages yield None.
    pub fn parse(raw: &JsonValue) -> Option<Self> {
        match Self::deserialize(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                debug!(error = %err, "Ignoring unrecognized message");
                None
            }
        }
    }
}

/// A side effect performed against a port.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SkipWaiting,
    ClaimClients,
    DeleteCache(String),
    CachePut {
        cache: String,
        entry: CacheEntry,
    },
    /// Batch write used to seed a bucket.
    Precache {
        cache: String,
        entries: Vec<CacheEntry>,
    },
    ShowNotification(NotificationDescriptor),
    CloseNotification {
        tag: String,
    },
    FocusClient {
        client_id: String,
    },
    PostMessage {
        client_id: String,
        message: ClientMessage,
    },
    OpenWindow {
        url: String,
    },
    ScheduleNotification {
        delay: Duration,
        notification: NotificationDescriptor,
    },
}

impl Effect {
    /// Effect name as used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SkipWaiting => "skip_waiting",
            Self::ClaimClients => "claim_clients",
            Self::DeleteCache(_) => "delete_cache",
            Self::CachePut { .. } => "cache_put",
            Self::Precache { .. } => "precache",
            Self::ShowNotification(_) => "show_notification",
            Self::CloseNotification { .. } => "close_notification",
            Self::FocusClient { .. } => "focus_client",
            Self::PostMessage { .. } => "post_message",
            Self::OpenWindow { .. } => "open_window",
            Self::ScheduleNotification { .. } => "schedule_notification",
        }
    }
}

/// Delete every bucket but the current one, then take control of open pages.
pub fn plan_activate(current: &str, cache_names: &[String]) -> Vec<Effect> {
    let mut effects: Vec<Effect> = cache_names
        .iter()
        .filter(|name| name.as_str() != current)
        .map(|name| Effect::DeleteCache(name.clone()))
        .collect();
    effects.push(Effect::ClaimClients);
    effects
}

/// Show the notification decoded from a push payload.
pub fn plan_push(payload: Option<&[u8]>, config: &WorkerConfig) -> Vec<Effect> {
    vec![Effect::ShowNotification(NotificationDescriptor::from_push(
        payload,
        &config.notification,
    ))]
}

/// Route a notification click. The notification is always closed first.
///
/// `windows` is the runtime's list of open window clients; only the first
/// suitable window is ever focused.
pub fn plan_click(
    click: &NotificationClick,
    windows: &[Client],
    origin: &Url,
    config: &WorkerConfig,
) -> Vec<Effect> {
    let notification = &click.notification;
    let mut effects = vec![Effect::CloseNotification {
        tag: notification.tag.clone(),
    }];

    match click.action.as_deref() {
        Some(ACTION_WATCH) => match windows.iter().find(|w| w.same_origin(origin)) {
            Some(window) => {
                effects.push(Effect::FocusClient {
                    client_id: window.id.clone(),
                });
                effects.push(Effect::PostMessage {
                    client_id: window.id.clone(),
                    message: ClientMessage::ShowLiveMatches {
                        data: notification.data.clone(),
                    },
                });
            }
            None => effects.push(Effect::OpenWindow {
                url: watch_url(&notification.data.url),
            }),
        },
        Some(ACTION_REMIND) => effects.push(Effect::ScheduleNotification {
            delay: config.reminder_delay(),
            notification: NotificationDescriptor::reminder(
                &config.reminder,
                &config.notification,
                notification.data.clone(),
            ),
        }),
        Some(ACTION_DISMISS) => {}
        Some(other) => debug!(action = other, "Unknown notification action, closing only"),
        None => match windows.first() {
            Some(window) => effects.push(Effect::FocusClient {
                client_id: window.id.clone(),
            }),
            None => effects.push(Effect::OpenWindow {
                url: notification.data.url.clone(),
            }),
        },
    }

    effects
}

/// Effects for a page message.
pub fn plan_message(message: &WorkerMessage, config: &WorkerConfig) -> Vec<Effect> {
    match message {
        WorkerMessage::SkipWaiting => vec![Effect::SkipWaiting],
        WorkerMessage::ScheduleNotification {
            title,
            body,
            delay,
            match_data,
        } => vec![Effect::ScheduleNotification {
            delay: millis(delay.unwrap_or(0.0)),
            notification: NotificationDescriptor::scheduled(
                title.clone(),
                body.clone(),
                match_data.clone(),
                &config.notification,
            ),
        }],
    }
}

/// Target URL with the watch marker appended.
pub fn watch_url(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}action=watch", url, separator)
}

// Numbers and numeric strings are accepted, like a page's timer call would.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn millis(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_millis(value as u64)
    } else {
        Duration::ZERO
    }
}
