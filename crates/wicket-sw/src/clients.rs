//! Controlled pages and the clients port.

use crate::error::{ServiceWorkerError, SwResult};
use crate::notification::NotificationData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// A client (controlled page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this worker controls the client.
    pub controlled: bool,
}

impl Client {
    /// Create a window client.
    pub fn window(url: Url) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            id: format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)),
            url,
            client_type: ClientType::Window,
            focused: false,
            controlled: false,
        }
    }

    /// Whether the client's page shares an origin with `origin`.
    pub fn same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// Messages the worker posts to pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientMessage {
    ShowLiveMatches { data: NotificationData },
}

/// Access to the pages this worker can reach.
#[async_trait]
pub trait ClientsPort: Send + Sync {
    /// Clients of a type, in the runtime's order.
    async fn match_all(&self, client_type: ClientType) -> SwResult<Vec<Client>>;

    /// Focus a window client.
    async fn focus(&self, id: &str) -> SwResult<()>;

    /// Post a message to a client.
    async fn post_message(&self, id: &str, message: ClientMessage) -> SwResult<()>;

    /// Open a new window. Relative URLs resolve against the app origin.
    async fn open_window(&self, url: &str) -> SwResult<Client>;

    /// Take control of every open client. Returns how many were claimed.
    async fn claim(&self) -> SwResult<usize>;
}

/// Clients registry.
#[derive(Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
    messages: Vec<(String, ClientMessage)>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> SwResult<&mut Client> {
        self.clients
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {}", id)))
    }

    /// Match all clients.
    pub fn match_all(&self, client_type: ClientType) -> Vec<&Client> {
        self.clients
            .iter()
            .filter(|c| c.client_type == client_type)
            .collect()
    }

    /// Focus the client, unfocusing every other one.
    pub fn focus(&mut self, id: &str) -> SwResult<()> {
        if self.get_mut(id)?.client_type != ClientType::Window {
            return Err(ServiceWorkerError::Client(
                "Can only focus window clients".to_string(),
            ));
        }
        for client in &mut self.clients {
            client.focused = client.id == id;
        }
        Ok(())
    }

    /// Queue a message for a client.
    pub fn post_message(&mut self, id: &str, message: ClientMessage) -> SwResult<()> {
        self.get_mut(id)?;
        self.messages.push((id.to_string(), message));
        Ok(())
    }

    /// Open a focused window.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        client.controlled = true;
        self.add(client.clone());
        if let Err(err) = self.focus(&client.id) {
            debug!(error = %err, "New window could not take focus");
        }
        client.focused = true;
        client
    }

    /// Claim all clients.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.push(client);
    }

    /// Messages posted so far, in order.
    pub fn messages(&self) -> &[(String, ClientMessage)] {
        &self.messages
    }
}

/// In-process clients port.
#[derive(Debug, Clone)]
pub struct MemoryClients {
    origin: Url,
    inner: Arc<RwLock<Clients>>,
}

impl MemoryClients {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            inner: Arc::new(RwLock::new(Clients::new())),
        }
    }

    /// Register an already open page and return its id.
    pub async fn add_window(&self, url: &str) -> SwResult<String> {
        let client = Client::window(self.origin.join(url)?);
        let id = client.id.clone();
        self.inner.write().await.add(client);
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<Client> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn windows(&self) -> Vec<Client> {
        self.inner
            .read()
            .await
            .match_all(ClientType::Window)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn messages(&self) -> Vec<(String, ClientMessage)> {
        self.inner.read().await.messages().to_vec()
    }
}

#[async_trait]
impl ClientsPort for MemoryClients {
    async fn match_all(&self, client_type: ClientType) -> SwResult<Vec<Client>> {
        Ok(self
            .inner
            .read()
            .await
            .match_all(client_type)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn focus(&self, id: &str) -> SwResult<()> {
        self.inner.write().await.focus(id)
    }

    async fn post_message(&self, id: &str, message: ClientMessage) -> SwResult<()> {
        self.inner.write().await.post_message(id, message)
    }

    async fn open_window(&self, url: &str) -> SwResult<Client> {
        let url = self.origin.join(url)?;
        debug!(%url, "Opening window");
        Ok(self.inner.write().await.open_window(url))
    }

    async fn claim(&self) -> SwResult<usize> {
        Ok(self.inner.write().await.claim())
    }
}
