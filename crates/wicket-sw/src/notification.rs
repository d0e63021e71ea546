//! Notification descriptors, push payload decoding, and the notification port.

use crate::cache::now_millis;
use crate::config::{NotificationDefaults, ReminderTemplate};
use crate::error::SwResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

pub const ACTION_WATCH: &str = "watch";
pub const ACTION_REMIND: &str = "remind";
pub const ACTION_DISMISS: &str = "dismiss";

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl NotificationAction {
    pub fn new(action: &str, title: &str, icon: Option<&str>) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
            icon: icon.map(str::to_string),
        }
    }

    pub fn watch() -> Self {
        Self::new(ACTION_WATCH, "Watch Live", Some("/icons/play.png"))
    }

    pub fn remind() -> Self {
        Self::new(ACTION_REMIND, "Remind in 5 min", Some("/icons/clock.png"))
    }

    pub fn dismiss() -> Self {
        Self::new(ACTION_DISMISS, "Dismiss", Some("/icons/close.png"))
    }

    /// watch / remind / dismiss, shown on every push.
    pub fn push_set() -> Vec<Self> {
        vec![Self::watch(), Self::remind(), Self::dismiss()]
    }
}

/// Payload attached to a notification and echoed back on click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Arrival time, ms since epoch.
    pub date_of_arrival: u64,

    /// Correlation id.
    pub primary_key: u64,

    /// Page to open on click.
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_data: Option<JsonValue>,
}

impl NotificationData {
    pub fn new(url: &str, match_data: Option<JsonValue>) -> Self {
        static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
        Self {
            date_of_arrival: now_millis(),
            primary_key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            url: url.to_string(),
            match_data,
        }
    }
}

/// Everything needed to display one notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDescriptor {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,

    /// Notifications sharing a tag replace each other.
    pub tag: String,

    /// Alert again when replacing a notification with the same tag.
    pub renotify: bool,

    /// Stay on screen until the user acts.
    pub require_interaction: bool,
}

impl NotificationDescriptor {
    /// The descriptor shown for a push without a usable payload.
    pub fn from_defaults(defaults: &NotificationDefaults) -> Self {
        Self {
            title: defaults.title.clone(),
            body: defaults.body.clone(),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData::new(&defaults.url, None),
            actions: NotificationAction::push_set(),
            tag: defaults.generic_tag.clone(),
            renotify: true,
            require_interaction: true,
        }
    }

    /// Build the descriptor for a push event.
    ///
    /// Never fails: a payload that is not a JSON object becomes the body.
    pub fn from_push(payload: Option<&[u8]>, defaults: &NotificationDefaults) -> Self {
        let mut descriptor = Self::from_defaults(defaults);

        match payload.map(PushPayload::decode) {
            None | Some(DecodedPush::Empty) => {}
            Some(DecodedPush::Text(text)) => {
                debug!(len = text.len(), "Push payload is not JSON, using it as body");
                descriptor.body = text;
            }
            Some(DecodedPush::Structured(push)) => descriptor.merge(push, defaults),
        }

        descriptor
    }

    fn merge(&mut self, push: PushPayload, defaults: &NotificationDefaults) {
        let tag = push
            .match_id()
            .map(|id| format!("{}{}", defaults.match_tag_prefix, id));

        if let Some(title) = push.title {
            self.title = title;
        }
        if let Some(body) = push.body {
            self.body = body;
        }
        if let Some(icon) = push.icon {
            self.icon = icon;
        }
        if let Some(badge) = push.badge {
            self.badge = badge;
        }
        if let Some(url) = push.url {
            self.data.url = url;
        }
        if let Some(actions) = push.actions {
            self.actions = actions;
        }
        self.data.match_data = push.match_data;
        if let Some(tag) = tag {
            self.tag = tag;
        }
    }

    /// The deferred "remind" notification.
    pub fn reminder(
        template: &ReminderTemplate,
        defaults: &NotificationDefaults,
        data: NotificationData,
    ) -> Self {
        Self {
            title: template.title.clone(),
            body: template.body.clone(),
            tag: template.tag.clone(),
            data,
            actions: vec![NotificationAction::watch(), NotificationAction::dismiss()],
            ..Self::from_defaults(defaults)
        }
    }

    /// A notification the page asked to show after a delay.
    pub fn scheduled(
        title: Option<String>,
        body: Option<String>,
        match_data: Option<JsonValue>,
        defaults: &NotificationDefaults,
    ) -> Self {
        let mut descriptor = Self::from_defaults(defaults);
        if let Some(title) = title {
            descriptor.title = title;
        }
        if let Some(body) = body {
            descriptor.body = body;
        }
        if let Some(id) = match_data.as_ref().and_then(|m| m.get("id")).and_then(id_to_string) {
            descriptor.tag = format!("{}{}", defaults.match_tag_prefix, id);
        }
        descriptor.data.match_data = match_data;
        descriptor.actions = vec![NotificationAction::watch(), NotificationAction::dismiss()];
        descriptor
    }
}

/// JSON fields a push may carry. All optional; a field of the wrong type
/// is ignored rather than failing the whole payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub url: Option<String>,
    pub match_data: Option<JsonValue>,
    pub match_id: Option<JsonValue>,
    pub actions: Option<Vec<NotificationAction>>,
}

/// Result of decoding raw push bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPush {
    Empty,
    Structured(PushPayload),
    Text(String),
}

impl PushPayload {
    pub fn decode(raw: &[u8]) -> DecodedPush {
        let text = String::from_utf8_lossy(raw);
        if text.trim().is_empty() {
            return DecodedPush::Empty;
        }
        match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(fields)) => DecodedPush::Structured(Self::from_object(&fields)),
            Ok(_) => {
                trace!("Push payload is JSON but not an object");
                DecodedPush::Text(text.into_owned())
            }
            Err(err) => {
                trace!(error = %err, "Push payload decode failed");
                DecodedPush::Text(text.into_owned())
            }
        }
    }

    fn from_object(fields: &serde_json::Map<String, JsonValue>) -> Self {
        let text = |key: &str| fields.get(key).and_then(JsonValue::as_str).map(str::to_string);
        let actions = fields
            .get("actions")
            .and_then(|v| serde_json::from_value::<Vec<NotificationAction>>(v.clone()).ok());
        if actions.is_none() && fields.contains_key("actions") {
            debug!("Ignoring malformed push actions");
        }

        Self {
            title: text("title"),
            body: text("body"),
            icon: text("icon"),
            badge: text("badge"),
            url: text("url"),
            match_data: fields.get("matchData").filter(|v| !v.is_null()).cloned(),
            match_id: fields.get("matchId").cloned(),
            actions,
        }
    }

    /// Match id as text, accepting strings and numbers.
    pub fn match_id(&self) -> Option<String> {
        self.match_id.as_ref().and_then(id_to_string)
    }
}

fn id_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Display surface for notifications.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Show a notification, replacing any visible one with the same tag.
    async fn show(&self, notification: NotificationDescriptor) -> SwResult<()>;

    /// Close the notification with this tag, if visible.
    async fn close(&self, tag: &str) -> SwResult<()>;
}

#[derive(Debug, Default)]
struct CenterState {
    visible: Vec<NotificationDescriptor>,
    shown: usize,
}

/// In-process notification tray.
#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    state: Arc<RwLock<CenterState>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently visible notifications, oldest first.
    pub async fn visible(&self) -> Vec<NotificationDescriptor> {
        self.state.read().await.visible.clone()
    }

    /// Visible notification with a tag.
    pub async fn get(&self, tag: &str) -> Option<NotificationDescriptor> {
        self.state
            .read()
            .await
            .visible
            .iter()
            .find(|n| n.tag == tag)
            .cloned()
    }

    /// Number of `show` calls ever made.
    pub async fn shown_count(&self) -> usize {
        self.state.read().await.shown
    }
}

#[async_trait]
impl NotificationPort for NotificationCenter {
    async fn show(&self, notification: NotificationDescriptor) -> SwResult<()> {
        let mut state = self.state.write().await;
        state.visible.retain(|n| n.tag != notification.tag);
        debug!(tag = %notification.tag, title = %notification.title, "Showing notification");
        state.visible.push(notification);
        state.shown += 1;
        Ok(())
    }

    async fn close(&self, tag: &str) -> SwResult<()> {
        self.state.write().await.visible.retain(|n| n.tag != tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> NotificationDefaults {
        NotificationDefaults::default()
    }

    fn push(raw: &str) -> NotificationDescriptor {
        NotificationDescriptor::from_push(Some(raw.as_bytes()), &defaults())
    }

    #[test]
    fn test_structured_payload_merges_over_defaults() {
        let n = push(r#"{"title":"X","matchId":"42"}"#);
        assert_eq!(n.title, "X");
        assert_eq!(n.tag, "cricket-match-42");
        assert_eq!(n.body, defaults().body);
        assert!(n.require_interaction);
        assert!(n.renotify);
    }

    #[test]
    fn test_numeric_match_id() {
        let n = push(r#"{"matchId":7}"#);
        assert_eq!(n.tag, "cricket-match-7");
    }

    #[test]
    fn test_missing_payload_uses_defaults() {
        let none = NotificationDescriptor::from_push(None, &defaults());
        let empty = push("");

        for n in [none, empty] {
            assert_eq!(n.title, "Cricket Live");
            assert_eq!(n.body, "New match update available!");
            assert_eq!(n.tag, "cricket-notification");
            assert_eq!(n.data.url, "/");
        }
    }

    #[test]
    fn test_plain_text_payload_becomes_body() {
        let n = push("plain text");
        let d = NotificationDescriptor::from_defaults(&defaults());

        assert_eq!(n.body, "plain text");
        assert_eq!(n.title, d.title);
        assert_eq!(n.icon, d.icon);
        assert_eq!(n.badge, d.badge);
        assert_eq!(n.vibrate, d.vibrate);
        assert_eq!(n.tag, d.tag);
        assert_eq!(n.actions, d.actions);
    }

    #[test]
    fn test_json_array_is_treated_as_text() {
        let n = push("[1,2]");
        assert_eq!(n.body, "[1,2]");
    }

    #[test]
    fn test_mistyped_field_keeps_the_rest() {
        let n = push(r#"{"title":"X","matchId":"42","icon":7}"#);
        assert_eq!(n.title, "X");
        assert_eq!(n.tag, "cricket-match-42");
        assert_eq!(n.icon, defaults().icon);
        assert_eq!(n.body, defaults().body);
    }

    #[test]
    fn test_malformed_actions_fall_back_to_defaults() {
        let n = push(r#"{"matchId":"42","actions":["watch"]}"#);
        assert_eq!(n.tag, "cricket-match-42");
        assert_eq!(n.actions, NotificationAction::push_set());
    }

    #[test]
    fn test_default_action_set() {
        let n = NotificationDescriptor::from_defaults(&defaults());
        let ids: Vec<&str> = n.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(ids, vec!["watch", "remind", "dismiss"]);
    }

    #[test]
    fn test_payload_actions_override() {
        let n = push(r#"{"actions":[{"action":"watch","title":"Go"}]}"#);
        assert_eq!(n.actions, vec![NotificationAction::new("watch", "Go", None)]);
    }

    #[test]
    fn test_match_data_and_url_carried() {
        let n = push(r#"{"url":"/matches/9","matchData":{"score":"120/3"}}"#);
        assert_eq!(n.data.url, "/matches/9");
        assert_eq!(n.data.match_data.unwrap()["score"], "120/3");
    }

    #[test]
    fn test_scheduled_uses_match_id_tag() {
        let n = NotificationDescriptor::scheduled(
            Some("Toss".to_string()),
            None,
            Some(serde_json::json!({"id": "55"})),
            &defaults(),
        );
        assert_eq!(n.title, "Toss");
        assert_eq!(n.tag, "cricket-match-55");
        assert_eq!(n.actions.len(), 2);
    }

    #[tokio::test]
    async fn test_center_replaces_same_tag() {
        let center = NotificationCenter::new();
        let first = push(r#"{"title":"Over 10","matchId":"1"}"#);
        let second = push(r#"{"title":"Over 11","matchId":"1"}"#);

        center.show(first).await.unwrap();
        center.show(second).await.unwrap();

        let visible = center.visible().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Over 11");
        assert_eq!(center.shown_count().await, 2);
    }

    #[tokio::test]
    async fn test_center_close() {
        let center = NotificationCenter::new();
        center
            .show(NotificationDescriptor::from_defaults(&defaults()))
            .await
            .unwrap();
        center.close("cricket-notification").await.unwrap();
        assert!(center.visible().await.is_empty());
    }
}
