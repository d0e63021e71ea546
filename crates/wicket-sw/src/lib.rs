//! # Wicket Service Worker
//!
//! Offline caching and push notifications for the Wicket live cricket score
//! app, written against ports so the policy runs without a browser.
//!
//! ## Features
//!
//! - **Install**: seed a versioned cache bucket, all or nothing
//! - **Activate**: evict every other bucket, claim open pages
//! - **Fetch**: network-first for live data, cache-first for static assets
//! - **Push**: decode payloads into notifications, one per match tag
//! - **Notification clicks**: watch, remind later, dismiss
//! - **Background sync**: refresh stored match data
//!
//! ## Architecture
//!
//! ```text
//! LifecycleEvent ──→ ServiceWorker::handle
//!                        │
//!                        ├── dispatch (pure planners) ──→ Vec<Effect>
//!                        │
//!                        └── apply ──→ ports
//!                                ├── NetworkPort
//!                                ├── CachePort        (MemoryCacheStorage)
//!                                ├── NotificationPort (NotificationCenter)
//!                                ├── ClientsPort      (MemoryClients)
//!                                ├── RegistrationPort (MemoryRegistration)
//!                                └── ReminderScheduler (tokio timers)
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod notification;
pub mod registration;
pub mod scheduler;
pub mod strategy;
pub mod worker;

pub use cache::{Cache, CacheEntry, CachePort, CacheStorage, MemoryCacheStorage};
pub use clients::{Client, ClientMessage, ClientType, ClientsPort, MemoryClients};
pub use config::{NotificationDefaults, ReminderTemplate, WorkerConfig};
pub use dispatch::{Effect, LifecycleEvent, NotificationClick, WorkerMessage};
pub use error::{ServiceWorkerError, SwResult};
pub use http::{CacheKey, NetworkPort, Request, Response, ResponseType};
pub use notification::{
    NotificationAction, NotificationCenter, NotificationData, NotificationDescriptor,
    NotificationPort, PushPayload,
};
pub use registration::{MemoryRegistration, Registration, RegistrationPort};
pub use scheduler::{ReminderScheduler, ScheduledTask, TaskState};
pub use strategy::FetchStrategy;
pub use worker::{EventOutcome, ServiceWorker, WorkerPorts};
