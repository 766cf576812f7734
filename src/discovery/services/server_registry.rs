//! Connection lifecycle for capability-providing servers.

use super::EventChannel;
use crate::discovery::{
    domain::{
        ConnectionState, DiscoveryDomainError, ServerConnection, ServerDescriptor, ServerEvent,
        ServerId, ToolCapability,
    },
    ports::{
        McpClientError, McpClientFactory, McpServerClient, ToolCallOutput, ToolListChanged,
    },
};
use mockable::Clock;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Errors returned by [`ServerRegistry`].
#[derive(Debug, Error)]
pub enum ServerRegistryError {
    /// The id is already registered; unregister it first.
    #[error("server {0} is already registered")]
    DuplicateServer(ServerId),

    /// No server is registered under the id.
    #[error("server {0} is not registered")]
    NotFound(ServerId),

    /// The operation needs a `connected` server.
    #[error("server {server_id} is unavailable (state: {state})")]
    Unavailable {
        /// Server identifier.
        server_id: ServerId,
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// Connecting to the server failed; it is now in `error`.
    #[error("connection to server {server_id} failed: {reason}")]
    Connection {
        /// Server identifier.
        server_id: ServerId,
        /// Failure description.
        reason: String,
    },

    /// A round-trip to a connected server failed.
    #[error("server {server_id}: {source}")]
    Client {
        /// Server identifier.
        server_id: ServerId,
        /// Client failure.
        #[source]
        source: McpClientError,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] DiscoveryDomainError),
}

/// Result type for server registry operations.
pub type ServerRegistryResult<T> = Result<T, ServerRegistryError>;

struct ServerEntry {
    connection: ServerConnection,
    client: Option<Arc<dyn McpServerClient>>,
}

/// Owner of every registered server's connection record and handle.
pub struct ServerRegistry<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    factory: Arc<F>,
    clock: Arc<C>,
    servers: RwLock<HashMap<ServerId, ServerEntry>>,
    events: EventChannel<ServerEvent>,
}

impl<F, C> ServerRegistry<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(factory: Arc<F>, clock: Arc<C>, event_capacity: usize) -> Self {
        Self {
            factory,
            clock,
            servers: RwLock::new(HashMap::new()),
            events: EventChannel::new(event_capacity),
        }
    }

    /// Subscribes to server lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Registers a server and, when enabled, connects to it.
    ///
    /// A failed connection leaves the server registered in `error`; only an
    /// explicit unregister followed by a new register recovers it.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::DuplicateServer`] when the id is taken,
    /// or the connection failure.
    pub async fn register(
        &self,
        descriptor: ServerDescriptor,
    ) -> ServerRegistryResult<ServerConnection> {
        let server_id = descriptor.id().clone();
        let enabled = descriptor.enabled();
        {
            let mut servers = self.servers.write();
            if servers.contains_key(&server_id) {
                return Err(ServerRegistryError::DuplicateServer(server_id));
            }
            servers.insert(
                server_id.clone(),
                ServerEntry {
                    connection: ServerConnection::new(descriptor, &*self.clock),
                    client: None,
                },
            );
        }
        info!(server_id = %server_id, enabled, "server registered");

        if !enabled {
            return self.snapshot(&server_id);
        }
        self.connect(&server_id).await
    }

    /// Connects a `disconnected` server.
    ///
    /// Also fetches the initial capability set. A remote error while listing
    /// leaves the server connected with no capabilities; a transport error
    /// moves it to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] for unknown ids, a domain
    /// error when the server is not `disconnected`, or
    /// [`ServerRegistryError::Connection`].
    pub async fn connect(&self, server_id: &ServerId) -> ServerRegistryResult<ServerConnection> {
        let descriptor = {
            let mut servers = self.servers.write();
            let entry = servers
                .get_mut(server_id)
                .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))?;
            entry.connection.mark_connecting(&*self.clock)?;
            entry.connection.descriptor().clone()
        };
        debug!(server_id = %server_id, transport = descriptor.transport().kind(), "connecting");

        let client = match self.factory.create(&descriptor) {
            Ok(created) => created,
            Err(err) => return Err(self.fail_connection(server_id, err.message()).await),
        };
        if let Err(err) = client.connect().await {
            return Err(self.fail_connection(server_id, err.message()).await);
        }

        let acknowledged = {
            let mut servers = self.servers.write();
            match servers.get_mut(server_id) {
                Some(entry) if entry.connection.state() == ConnectionState::Connecting => {
                    entry.connection.mark_connected(&*self.clock)?;
                    entry.client = Some(Arc::clone(&client));
                    true
                }
                _ => false,
            }
        };
        if !acknowledged {
            close_client(server_id, client.as_ref()).await;
            return Err(ServerRegistryError::NotFound(server_id.clone()));
        }

        let capability_names = match self.fetch_capabilities(server_id).await {
            Ok(capabilities) => capabilities
                .iter()
                .map(|capability| capability.name().to_owned())
                .collect(),
            Err(err @ ServerRegistryError::Client { .. }) if !self.is_connected(server_id) => {
                return Err(ServerRegistryError::Connection {
                    server_id: server_id.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "initial capability listing failed");
                Vec::new()
            }
        };

        info!(server_id = %server_id, tools = capability_names.len(), "server connected");
        self.events.emit(ServerEvent::ServerConnected {
            server_id: server_id.clone(),
            capabilities: capability_names,
        });
        self.snapshot(server_id)
    }

    /// Closes a server's handle while keeping it registered.
    ///
    /// Disconnecting an already-disconnected server is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] for unknown ids.
    pub async fn disconnect(&self, server_id: &ServerId, reason: &str) -> ServerRegistryResult<()> {
        let client = {
            let mut servers = self.servers.write();
            let entry = servers
                .get_mut(server_id)
                .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))?;
            if entry.connection.state() == ConnectionState::Disconnected {
                debug!(server_id = %server_id, "server already disconnected");
                return Ok(());
            }
            entry.connection.mark_disconnected(&*self.clock);
            entry.client.take()
        };

        if let Some(handle) = client {
            close_client(server_id, handle.as_ref()).await;
        }
        info!(server_id = %server_id, reason, "server disconnected");
        self.events.emit(ServerEvent::ServerDisconnected {
            server_id: server_id.clone(),
            reason: reason.to_owned(),
        });
        Ok(())
    }

    /// Removes a server, closing its handle.
    ///
    /// Returns the final connection record, or `None` when the server was
    /// not registered, which makes repeated calls harmless.
    pub async fn unregister(&self, server_id: &ServerId, reason: &str) -> Option<ServerConnection> {
        let removed = self.servers.write().remove(server_id);
        let Some(mut entry) = removed else {
            debug!(server_id = %server_id, "unregister ignored for unknown server");
            return None;
        };

        if let Some(handle) = entry.client.take() {
            close_client(server_id, handle.as_ref()).await;
        }
        entry.connection.mark_disconnected(&*self.clock);
        info!(server_id = %server_id, reason, "server unregistered");
        self.events.emit(ServerEvent::ServerDisconnected {
            server_id: server_id.clone(),
            reason: reason.to_owned(),
        });
        Some(entry.connection)
    }

    /// Lists a connected server's tools and caches them.
    ///
    /// Malformed or duplicate capability payloads are skipped with a
    /// warning. A transport failure moves the server to `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::Unavailable`] unless the server is
    /// `connected`, or [`ServerRegistryError::Client`] when listing fails.
    pub async fn fetch_capabilities(
        &self,
        server_id: &ServerId,
    ) -> ServerRegistryResult<Vec<ToolCapability>> {
        let client = self.client(server_id)?;
        let payloads = match client.list_capabilities().await {
            Ok(listed) => listed,
            Err(err) => return Err(self.handle_client_error(server_id, err).await),
        };
        let capabilities = decode_capabilities(server_id, &payloads);

        {
            let mut servers = self.servers.write();
            let entry = servers
                .get_mut(server_id)
                .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))?;
            entry
                .connection
                .replace_capabilities(capabilities.clone(), &*self.clock);
        }
        debug!(server_id = %server_id, tools = capabilities.len(), "capabilities cached");
        self.events.emit(ServerEvent::CapabilitiesUpdated {
            server_id: server_id.clone(),
            tool_count: capabilities.len(),
        });
        Ok(capabilities)
    }

    /// Invokes a tool on a connected server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::Unavailable`] unless the server is
    /// `connected`, or [`ServerRegistryError::Client`] when the call fails.
    pub async fn call_tool(
        &self,
        server_id: &ServerId,
        tool_name: &str,
        arguments: Value,
    ) -> ServerRegistryResult<ToolCallOutput> {
        let client = self.client(server_id)?;
        match client.call_tool(tool_name, arguments).await {
            Ok(output) => Ok(output),
            Err(err) => Err(self.handle_client_error(server_id, err).await),
        }
    }

    /// Returns the last cached capability set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] for unknown ids.
    pub fn cached_capabilities(
        &self,
        server_id: &ServerId,
    ) -> ServerRegistryResult<Vec<ToolCapability>> {
        self.servers
            .read()
            .get(server_id)
            .map(|entry| entry.connection.capabilities().to_vec())
            .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))
    }

    /// Returns the handle of a connected server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] or
    /// [`ServerRegistryError::Unavailable`].
    pub fn client(&self, server_id: &ServerId) -> ServerRegistryResult<Arc<dyn McpServerClient>> {
        let servers = self.servers.read();
        let entry = servers
            .get(server_id)
            .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))?;
        let unavailable = || ServerRegistryError::Unavailable {
            server_id: server_id.clone(),
            state: entry.connection.state(),
        };
        if !entry.connection.state().is_connected() {
            return Err(unavailable());
        }
        entry.client.clone().ok_or_else(unavailable)
    }

    /// Subscribes to a connected server's tool-list change notifications.
    #[must_use]
    pub fn capability_changes(
        &self,
        server_id: &ServerId,
    ) -> Option<broadcast::Receiver<ToolListChanged>> {
        self.client(server_id)
            .ok()
            .and_then(|client| client.capability_changes())
    }

    /// Returns a copy of a server's connection record.
    #[must_use]
    pub fn connection(&self, server_id: &ServerId) -> Option<ServerConnection> {
        self.servers
            .read()
            .get(server_id)
            .map(|entry| entry.connection.clone())
    }

    /// Returns every connection record ordered by server id.
    #[must_use]
    pub fn connections(&self) -> Vec<ServerConnection> {
        let mut connections: Vec<_> = self
            .servers
            .read()
            .values()
            .map(|entry| entry.connection.clone())
            .collect();
        connections.sort_by(|left, right| left.id().cmp(right.id()));
        connections
    }

    /// Returns the ids of `connected` servers in id order.
    #[must_use]
    pub fn connected_server_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<_> = self
            .servers
            .read()
            .iter()
            .filter(|(_, entry)| entry.connection.state().is_connected())
            .map(|(server_id, _)| server_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Returns whether a server is registered and `connected`.
    #[must_use]
    pub fn is_connected(&self, server_id: &ServerId) -> bool {
        self.servers
            .read()
            .get(server_id)
            .is_some_and(|entry| entry.connection.state().is_connected())
    }

    /// Unregisters every server.
    pub async fn close_all(&self, reason: &str) {
        let server_ids: Vec<_> = self.servers.read().keys().cloned().collect();
        for server_id in server_ids {
            if self.unregister(&server_id, reason).await.is_none() {
                debug!(server_id = %server_id, "server removed concurrently during close");
            }
        }
    }

    fn snapshot(&self, server_id: &ServerId) -> ServerRegistryResult<ServerConnection> {
        self.connection(server_id)
            .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))
    }

    async fn handle_client_error(
        &self,
        server_id: &ServerId,
        err: McpClientError,
    ) -> ServerRegistryError {
        if err.is_transport() {
            let failure = self.fail_connection(server_id, err.message()).await;
            debug!(server_id = %server_id, error = %failure, "transport failure recorded");
        }
        ServerRegistryError::Client {
            server_id: server_id.clone(),
            source: err,
        }
    }

    async fn fail_connection(&self, server_id: &ServerId, reason: String) -> ServerRegistryError {
        let client = {
            let mut servers = self.servers.write();
            servers.get_mut(server_id).and_then(|entry| {
                if let Err(err) = entry.connection.mark_failed(reason.clone(), &*self.clock) {
                    debug!(server_id = %server_id, error = %err, "failure not recorded");
                }
                entry.client.take()
            })
        };
        if let Some(handle) = client {
            close_client(server_id, handle.as_ref()).await;
        }

        error!(server_id = %server_id, reason = %reason, "server connection failed");
        self.events.emit(ServerEvent::ServerError {
            server_id: server_id.clone(),
            error: reason.clone(),
        });
        ServerRegistryError::Connection {
            server_id: server_id.clone(),
            reason,
        }
    }
}

async fn close_client(server_id: &ServerId, client: &dyn McpServerClient) {
    if let Err(err) = client.disconnect().await {
        warn!(server_id = %server_id, error = %err, "closing server handle failed");
    }
}

fn decode_capabilities(server_id: &ServerId, payloads: &[Value]) -> Vec<ToolCapability> {
    let mut seen = HashSet::new();
    payloads
        .iter()
        .filter_map(|payload| match ToolCapability::from_untrusted(payload) {
            Ok(capability) => Some(capability),
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "skipping malformed capability");
                None
            }
        })
        .filter(|capability| {
            let first = seen.insert(capability.name().to_owned());
            if !first {
                warn!(
                    server_id = %server_id,
                    tool = capability.name(),
                    "skipping duplicate capability name"
                );
            }
            first
        })
        .collect()
}
