//! The service worker: lifecycle handlers wired to the ports.

use crate::cache::{CacheEntry, CachePort};
use crate::clients::{ClientType, ClientsPort};
use crate::config::WorkerConfig;
use crate::dispatch::{
    plan_activate, plan_click, plan_message, plan_push, Effect, LifecycleEvent,
    NotificationClick, WorkerMessage,
};
use crate::error::{ServiceWorkerError, SwResult};
use crate::http::{CacheKey, NetworkPort, Request, Response};
use crate::notification::NotificationPort;
use crate::registration::RegistrationPort;
use crate::scheduler::{ReminderScheduler, ScheduledTask};
use crate::strategy::{admits_dynamic, admits_static, classify, FetchStrategy};
use futures::future::try_join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Everything the worker talks to.
#[derive(Clone)]
pub struct WorkerPorts {
    pub network: Arc<dyn NetworkPort>,
    pub caches: Arc<dyn CachePort>,
    pub notifications: Arc<dyn NotificationPort>,
    pub clients: Arc<dyn ClientsPort>,
    pub registration: Arc<dyn RegistrationPort>,
}

/// What handling one event did.
#[derive(Debug, Default)]
pub struct EventOutcome {
    /// Effects applied, in order.
    pub effects: Vec<Effect>,

    /// Response for a fetch event. None if the request stays unresolved.
    pub response: Option<Response>,

    /// The failure that was logged and suppressed, if any.
    pub error: Option<ServiceWorkerError>,
}

impl EventOutcome {
    fn failed(error: ServiceWorkerError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Cache and notification policy for the live score app.
pub struct ServiceWorker {
    config: WorkerConfig,
    origin: Url,
    ports: WorkerPorts,
    scheduler: ReminderScheduler,
}

impl ServiceWorker {
    /// Create a worker. Fails if the configured origin is not a URL.
    pub fn new(config: WorkerConfig, ports: WorkerPorts) -> SwResult<Self> {
        let origin = config.origin_url()?;
        let scheduler = ReminderScheduler::new(Arc::clone(&ports.notifications));
        Ok(Self {
            config,
            origin,
            ports,
            scheduler,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handle one lifecycle event.
    ///
    /// Resolves once all work the event started has settled; scheduled
    /// reminders keep running on their own. Never fails: errors are logged
    /// and reported in the outcome.
    pub async fn handle(&self, event: LifecycleEvent) -> EventOutcome {
        let name = event.name();
        trace!(event = name, "Handling lifecycle event");

        let outcome = match event {
            LifecycleEvent::Install => self.on_install().await,
            LifecycleEvent::Activate => self.on_activate().await,
            LifecycleEvent::Fetch(request) => self.on_fetch(request).await,
            LifecycleEvent::Push { data } => self.on_push(data.as_deref()).await,
            LifecycleEvent::NotificationClick(click) => self.on_notification_click(click).await,
            LifecycleEvent::NotificationClose { tag } => {
                debug!(%tag, "Notification closed");
                EventOutcome::default()
            }
            LifecycleEvent::Sync { tag } => self.on_sync(&tag).await,
            LifecycleEvent::Message(message) => self.on_message(&message).await,
            LifecycleEvent::Error { message } => {
                error!(%message, "Uncaught error in worker");
                EventOutcome::default()
            }
            LifecycleEvent::UnhandledRejection { reason } => {
                error!(%reason, "Unhandled rejection in worker");
                EventOutcome::default()
            }
        };

        if let Some(ref err) = outcome.error {
            warn!(event = name, kind = err.kind(), error = %err, "Event handler failed");
        }
        outcome
    }

    /// Seed the current bucket with every precache asset, all or nothing.
    pub async fn on_install(&self) -> EventOutcome {
        let cache = self.config.cache_version.clone();
        info!(%cache, assets = self.config.precache.len(), "Installing");

        let entries = match try_join_all(self.config.precache.iter().map(|u| self.fetch_asset(u))).await {
            Ok(entries) => entries,
            Err(err) => return EventOutcome::failed(err),
        };

        let precache = Effect::Precache { cache, entries };
        if let Err(err) = self.apply_one(&precache).await {
            return EventOutcome::failed(ServiceWorkerError::InstallFailed(err.to_string()));
        }

        let mut outcome = EventOutcome {
            effects: vec![precache],
            ..Default::default()
        };
        self.apply(vec![Effect::SkipWaiting], &mut outcome).await;
        outcome
    }

    async fn fetch_asset(&self, url: &str) -> SwResult<CacheEntry> {
        let request = Request::get(self.config.resolve(url)?);
        let response = self
            .ports
            .network
            .fetch(&request)
            .await
            .map_err(|e| ServiceWorkerError::InstallFailed(format!("{}: {}", url, e)))?;
        if !response.ok() {
            return Err(ServiceWorkerError::InstallFailed(format!(
                "{} returned {}",
                url, response.status
            )));
        }
        Ok(CacheEntry::from_response(&request.cache_key(), &response))
    }

    /// Drop stale buckets and take control of open pages.
    pub async fn on_activate(&self) -> EventOutcome {
        let names = match self.ports.caches.keys().await {
            Ok(names) => names,
            Err(err) => return EventOutcome::failed(err),
        };
        let effects = plan_activate(&self.config.cache_version, &names);
        info!(stale = effects.len() - 1, "Activating");

        let mut outcome = EventOutcome::default();
        self.apply(effects, &mut outcome).await;
        outcome
    }

    /// Serve an intercepted request.
    pub async fn on_fetch(&self, request: Request) -> EventOutcome {
        let strategy = classify(&request, &self.config);
        trace!(url = %request.url, ?strategy, "Serving request");

        let mut outcome = EventOutcome::default();
        let served = match strategy {
            FetchStrategy::Passthrough => self.ports.network.fetch(&request).await,
            FetchStrategy::NetworkFirst => self.network_first(&request, &mut outcome).await,
            FetchStrategy::CacheFirst => self.cache_first(&request, &mut outcome).await,
        };

        match served {
            Ok(response) => outcome.response = Some(response),
            Err(err) => outcome.error = Some(err),
        }
        outcome
    }

    async fn network_first(&self, request: &Request, outcome: &mut EventOutcome) -> SwResult<Response> {
        let key = request.cache_key();
        match self.ports.network.fetch(request).await {
            Ok(response) => {
                if admits_dynamic(&response) {
                    self.store_copy(&key, &response, outcome).await;
                }
                Ok(response)
            }
            Err(err) => match self.lookup(&key).await {
                Some(entry) => {
                    debug!(%key, error = %err, "Network failed, serving cached copy");
                    Ok(Response::from_cache(&entry))
                }
                None => Err(err),
            },
        }
    }

    async fn cache_first(&self, request: &Request, outcome: &mut EventOutcome) -> SwResult<Response> {
        let key = request.cache_key();
        if let Some(entry) = self.lookup(&key).await {
            trace!(%key, "Cache hit");
            return Ok(Response::from_cache(&entry));
        }

        let response = self.ports.network.fetch(request).await?;
        if admits_static(&response) {
            self.store_copy(&key, &response, outcome).await;
        }
        Ok(response)
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self
            .ports
            .caches
            .match_request(&self.config.cache_version, key)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%key, error = %err, "Cache lookup failed");
                None
            }
        }
    }

    // A failed write never fails the response.
    async fn store_copy(&self, key: &CacheKey, response: &Response, outcome: &mut EventOutcome) {
        let effect = Effect::CachePut {
            cache: self.config.cache_version.clone(),
            entry: CacheEntry::from_response(key, response),
        };
        match self.apply_one(&effect).await {
            Ok(()) => outcome.effects.push(effect),
            Err(err) => warn!(%key, error = %err, "Could not store response copy"),
        }
    }

    /// Show the notification carried by a push.
    pub async fn on_push(&self, payload: Option<&[u8]>) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        self.apply(plan_push(payload, &self.config), &mut outcome).await;
        outcome
    }

    /// Route a click on a notification.
    pub async fn on_notification_click(&self, click: NotificationClick) -> EventOutcome {
        debug!(action = ?click.action, tag = %click.notification.tag, "Notification clicked");
        let windows = match self.ports.clients.match_all(ClientType::Window).await {
            Ok(windows) => windows,
            Err(err) => {
                warn!(error = %err, "Could not list windows");
                Vec::new()
            }
        };

        let mut outcome = EventOutcome::default();
        let effects = plan_click(&click, &windows, &self.origin, &self.config);
        self.apply(effects, &mut outcome).await;
        outcome
    }

    /// Refresh stored match data for the background sync tag.
    pub async fn on_sync(&self, tag: &str) -> EventOutcome {
        if tag != self.config.sync_tag {
            debug!(%tag, "Ignoring sync tag");
            return EventOutcome::default();
        }

        let mut outcome = EventOutcome::default();
        let request = match Request::parse_get(&self.config.sync_endpoint) {
            Ok(request) => request,
            Err(err) => return EventOutcome::failed(err),
        };
        let response = match self.ports.network.fetch(&request).await {
            Ok(response) if response.ok() => response,
            Ok(response) => {
                return EventOutcome::failed(ServiceWorkerError::Network(format!(
                    "sync endpoint returned {}",
                    response.status
                )))
            }
            Err(err) => return EventOutcome::failed(err),
        };

        let key = match self.config.resolve(&self.config.sync_cache_key) {
            Ok(url) => CacheKey::get(url.as_str()),
            Err(err) => return EventOutcome::failed(err),
        };
        let effect = Effect::CachePut {
            cache: self.config.cache_version.clone(),
            entry: CacheEntry::from_response(&key, &response),
        };
        self.apply(vec![effect], &mut outcome).await;
        info!(%key, bytes = response.body.len(), "Match data synced");
        outcome
    }

    /// Handle a message posted by a page.
    pub async fn on_message(&self, raw: &JsonValue) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        if let Some(message) = WorkerMessage::parse(raw) {
            self.apply(plan_message(&message, &self.config), &mut outcome).await;
        }
        outcome
    }

    /// Reminders waiting for their timer.
    pub async fn pending_reminders(&self) -> Vec<ScheduledTask> {
        self.scheduler.pending().await
    }

    /// Cancel every pending reminder.
    pub async fn cancel_reminders(&self) -> usize {
        self.scheduler.cancel_all().await
    }

    /// Apply effects in order. Failures are logged and the rest still run;
    /// display failures are never reported as the event's error.
    async fn apply(&self, effects: Vec<Effect>, outcome: &mut EventOutcome) {
        for effect in effects {
            match self.apply_one(&effect).await {
                Ok(()) => outcome.effects.push(effect),
                Err(err) => {
                    warn!(effect = effect.name(), error = %err, "Effect failed");
                    let is_display = matches!(effect, Effect::ShowNotification(_));
                    if !is_display && outcome.error.is_none() {
                        outcome.error = Some(err);
                    }
                }
            }
        }
    }

    async fn apply_one(&self, effect: &Effect) -> SwResult<()> {
        let ports = &self.ports;
        match effect {
            Effect::SkipWaiting => ports.registration.skip_waiting().await,
            Effect::ClaimClients => {
                let claimed = ports.clients.claim().await?;
                debug!(claimed, "Claimed clients");
                Ok(())
            }
            Effect::DeleteCache(name) => {
                if ports.caches.delete(name).await? {
                    info!(cache = %name, "Deleted stale cache");
                }
                Ok(())
            }
            Effect::CachePut { cache, entry } => ports.caches.put(cache, entry.clone()).await,
            Effect::Precache { cache, entries } => ports.caches.put_all(cache, entries.clone()).await,
            Effect::ShowNotification(notification) => {
                ports.notifications.show(notification.clone()).await
            }
            Effect::CloseNotification { tag } => ports.notifications.close(tag).await,
            Effect::FocusClient { client_id } => ports.clients.focus(client_id).await,
            Effect::PostMessage { client_id, message } => {
                ports.clients.post_message(client_id, message.clone()).await
            }
            Effect::OpenWindow { url } => ports.clients.open_window(url).await.map(|_| ()),
            Effect::ScheduleNotification {
                delay,
                notification,
            } => self
                .scheduler
                .schedule(*delay, notification.clone())
                .await
                .map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::clients::MemoryClients;
    use crate::notification::{NotificationCenter, NotificationDescriptor};
    use crate::registration::MemoryRegistration;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl NetworkPort for Offline {
        async fn fetch(&self, _request: &Request) -> SwResult<Response> {
            Err(ServiceWorkerError::Network("offline".to_string()))
        }
    }

    struct BrokenDisplay;

    #[async_trait]
    impl NotificationPort for BrokenDisplay {
        async fn show(&self, _notification: NotificationDescriptor) -> SwResult<()> {
            Err(ServiceWorkerError::Notification("permission denied".to_string()))
        }

        async fn close(&self, _tag: &str) -> SwResult<()> {
            Ok(())
        }
    }

    fn ports(notifications: Arc<dyn NotificationPort>) -> WorkerPorts {
        let _ = wicket_common::init_logging(wicket_common::LogConfig::for_tests());
        let origin = WorkerConfig::default().origin_url().unwrap();
        WorkerPorts {
            network: Arc::new(Offline),
            caches: Arc::new(MemoryCacheStorage::new()),
            notifications,
            clients: Arc::new(MemoryClients::new(origin)),
            registration: Arc::new(MemoryRegistration::new()),
        }
    }

    fn worker() -> ServiceWorker {
        ServiceWorker::new(WorkerConfig::default(), ports(Arc::new(NotificationCenter::new()))).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_origin() {
        let config = WorkerConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };
        let result = ServiceWorker::new(config, ports(Arc::new(NotificationCenter::new())));
        assert!(matches!(result, Err(ServiceWorkerError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_error_events_are_logged_only() {
        let worker = worker();
        let outcome = worker
            .handle(LifecycleEvent::Error {
                message: "boom".to_string(),
            })
            .await;
        assert!(outcome.is_ok());
        assert!(outcome.effects.is_empty());
    }

    #[tokio::test]
    async fn test_install_offline_fails() {
        let outcome = worker().handle(LifecycleEvent::Install).await;
        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("install"));
    }

    #[tokio::test]
    async fn test_sync_other_tag_is_noop() {
        let outcome = worker().on_sync("periodic-refresh").await;
        assert!(outcome.is_ok());
        assert!(outcome.effects.is_empty());
    }

    #[tokio::test]
    async fn test_display_failure_is_not_event_error() {
        let worker =
            ServiceWorker::new(WorkerConfig::default(), ports(Arc::new(BrokenDisplay))).unwrap();
        let outcome = worker.on_push(None).await;
        assert!(outcome.is_ok());
        assert!(outcome.effects.is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_error_leaves_request_unresolved() {
        let request = Request::parse_get("https://wicket.live/api/vote")
            .unwrap()
            .with_method("POST");
        let outcome = worker().on_fetch(request).await;
        assert!(outcome.response.is_none());
        assert!(matches!(outcome.error, Some(ServiceWorkerError::Network(_))));
    }
}
