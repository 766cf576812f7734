//! In-memory client adapter for discovery tests and local orchestration.

use crate::discovery::{
    domain::{ServerDescriptor, ServerId, ToolCapability},
    ports::{
        McpClientError, McpClientFactory, McpClientResult, McpServerClient, ToolCallOutput,
        ToolListChanged,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

const NOTIFICATION_CAPACITY: usize = 16;

/// In-memory factory of scriptable server clients.
///
/// Each server id owns a scripted catalog plus optional failures. Clients
/// created by the factory share its state, so scripting changes are visible
/// to already-connected clients.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMcpClientFactory {
    state: Arc<RwLock<InMemoryFactoryState>>,
    supports_push: bool,
}

#[derive(Debug, Default)]
struct InMemoryFactoryState {
    servers: HashMap<ServerId, ScriptedServer>,
    notifiers: HashMap<ServerId, broadcast::Sender<ToolListChanged>>,
}

#[derive(Debug, Default)]
struct ScriptedServer {
    catalog: Vec<Value>,
    connect_failure: Option<String>,
    transport_failure: Option<String>,
    listing_failure: Option<String>,
    listing_latency: Option<Duration>,
    tool_responses: HashMap<String, Value>,
    tool_failures: HashMap<String, String>,
    connected: bool,
    connect_count: u64,
    disconnect_count: u64,
    calls: Vec<(String, Value)>,
}

/// A recorded tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Remote tool name.
    pub tool_name: String,
    /// Arguments passed.
    pub arguments: Value,
}

fn lock_error(err: impl std::fmt::Display) -> McpClientError {
    McpClientError::runtime(std::io::Error::other(err.to_string()))
}

impl InMemoryMcpClientFactory {
    /// Creates an empty factory whose clients do not support push.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables tool-list change notifications on created clients.
    #[must_use]
    pub const fn with_push_notifications(mut self) -> Self {
        self.supports_push = true;
        self
    }

    fn with_server<T>(
        &self,
        server_id: &ServerId,
        apply: impl FnOnce(&mut ScriptedServer) -> T,
    ) -> McpClientResult<T> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(apply(state.servers.entry(server_id.clone()).or_default()))
    }

    /// Replaces the tool catalog a server declares.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_catalog(
        &self,
        server_id: &ServerId,
        tools: Vec<ToolCapability>,
    ) -> McpClientResult<()> {
        let payloads = tools
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(McpClientError::runtime)?;
        self.set_raw_catalog(server_id, payloads)
    }

    /// Replaces the catalog with raw, possibly malformed, payloads.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_raw_catalog(
        &self,
        server_id: &ServerId,
        payloads: Vec<Value>,
    ) -> McpClientResult<()> {
        self.with_server(server_id, |server| server.catalog = payloads)
    }

    /// Makes the next connection attempts fail with `message`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn fail_connect(
        &self,
        server_id: &ServerId,
        message: impl Into<String>,
    ) -> McpClientResult<()> {
        let reason = message.into();
        self.with_server(server_id, |server| server.connect_failure = Some(reason))
    }

    /// Makes listing and calls fail with a transport error.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn fail_transport(
        &self,
        server_id: &ServerId,
        message: impl Into<String>,
    ) -> McpClientResult<()> {
        let reason = message.into();
        self.with_server(server_id, |server| server.transport_failure = Some(reason))
    }

    /// Makes capability listing fail with a remote error.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn fail_listing(
        &self,
        server_id: &ServerId,
        message: impl Into<String>,
    ) -> McpClientResult<()> {
        let reason = message.into();
        self.with_server(server_id, |server| server.listing_failure = Some(reason))
    }

    /// Delays every capability listing by `latency`.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_listing_latency(
        &self,
        server_id: &ServerId,
        latency: Duration,
    ) -> McpClientResult<()> {
        self.with_server(server_id, |server| server.listing_latency = Some(latency))
    }

    /// Clears every scripted failure for a server.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn clear_failures(&self, server_id: &ServerId) -> McpClientResult<()> {
        self.with_server(server_id, |server| {
            server.connect_failure = None;
            server.transport_failure = None;
            server.listing_failure = None;
            server.tool_failures.clear();
        })
    }

    /// Sets the content a tool returns.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn set_tool_response(
        &self,
        server_id: &ServerId,
        tool_name: impl Into<String>,
        content: Value,
    ) -> McpClientResult<()> {
        let name = tool_name.into();
        self.with_server(server_id, |server| {
            server.tool_responses.insert(name, content);
        })
    }

    /// Makes a tool answer with a remote error.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn fail_tool(
        &self,
        server_id: &ServerId,
        tool_name: impl Into<String>,
        message: impl Into<String>,
    ) -> McpClientResult<()> {
        let name = tool_name.into();
        let reason = message.into();
        self.with_server(server_id, |server| {
            server.tool_failures.insert(name, reason);
        })
    }

    /// Sends a tool-list change notification to subscribed clients.
    ///
    /// Returns the number of subscribers reached.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn notify_capabilities_changed(&self, server_id: &ServerId) -> McpClientResult<usize> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .notifiers
            .get(server_id)
            .and_then(|sender| sender.send(ToolListChanged).ok())
            .unwrap_or(0))
    }

    /// Returns how many times a server was connected.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn connect_count(&self, server_id: &ServerId) -> McpClientResult<u64> {
        self.with_server(server_id, |server| server.connect_count)
    }

    /// Returns how many times a server's handle was actually closed.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn disconnect_count(&self, server_id: &ServerId) -> McpClientResult<u64> {
        self.with_server(server_id, |server| server.disconnect_count)
    }

    /// Returns the tool calls a server received, oldest first.
    ///
    /// # Errors
    ///
    /// Returns runtime errors when lock acquisition fails.
    pub fn calls(&self, server_id: &ServerId) -> McpClientResult<Vec<RecordedCall>> {
        self.with_server(server_id, |server| {
            server
                .calls
                .iter()
                .map(|(tool_name, arguments)| RecordedCall {
                    tool_name: tool_name.clone(),
                    arguments: arguments.clone(),
                })
                .collect()
        })
    }
}

impl McpClientFactory for InMemoryMcpClientFactory {
    fn create(&self, descriptor: &ServerDescriptor) -> McpClientResult<Arc<dyn McpServerClient>> {
        let mut state = self.state.write().map_err(lock_error)?;
        let server_id = descriptor.id().clone();
        state.servers.entry(server_id.clone()).or_default();
        let notifier = self.supports_push.then(|| {
            state
                .notifiers
                .entry(server_id.clone())
                .or_insert_with(|| broadcast::channel(NOTIFICATION_CAPACITY).0)
                .clone()
        });

        Ok(Arc::new(InMemoryMcpClient {
            server_id,
            state: Arc::clone(&self.state),
            notifier,
        }))
    }
}

/// Client handle created by [`InMemoryMcpClientFactory`].
#[derive(Debug)]
pub struct InMemoryMcpClient {
    server_id: ServerId,
    state: Arc<RwLock<InMemoryFactoryState>>,
    notifier: Option<broadcast::Sender<ToolListChanged>>,
}

impl InMemoryMcpClient {
    fn with_server<T>(
        &self,
        apply: impl FnOnce(&mut ScriptedServer) -> McpClientResult<T>,
    ) -> McpClientResult<T> {
        let mut state = self.state.write().map_err(lock_error)?;
        apply(state.servers.entry(self.server_id.clone()).or_default())
    }
}

fn ensure_open(server: &ScriptedServer) -> McpClientResult<()> {
    if let Some(reason) = &server.transport_failure {
        return Err(McpClientError::Transport(reason.clone()));
    }
    if !server.connected {
        return Err(McpClientError::Transport("connection is closed".to_owned()));
    }
    Ok(())
}

#[async_trait]
impl McpServerClient for InMemoryMcpClient {
    async fn connect(&self) -> McpClientResult<()> {
        self.with_server(|server| {
            if let Some(reason) = &server.connect_failure {
                return Err(McpClientError::Transport(reason.clone()));
            }
            server.connected = true;
            server.connect_count = server.connect_count.saturating_add(1);
            Ok(())
        })
    }

    async fn disconnect(&self) -> McpClientResult<()> {
        self.with_server(|server| {
            if server.connected {
                server.connected = false;
                server.disconnect_count = server.disconnect_count.saturating_add(1);
            }
            Ok(())
        })
    }

    async fn list_capabilities(&self) -> McpClientResult<Vec<Value>> {
        let latency = self.with_server(|server| Ok(server.listing_latency))?;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        self.with_server(|server| {
            ensure_open(server)?;
            if let Some(reason) = &server.listing_failure {
                return Err(McpClientError::Remote(reason.clone()));
            }
            Ok(server.catalog.clone())
        })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpClientResult<ToolCallOutput> {
        self.with_server(|server| {
            ensure_open(server)?;
            server.calls.push((name.to_owned(), arguments.clone()));
            if let Some(reason) = server.tool_failures.get(name) {
                return Err(McpClientError::Remote(reason.clone()));
            }
            let declared = server
                .catalog
                .iter()
                .any(|payload| payload.get("name").and_then(Value::as_str) == Some(name));
            if !declared {
                return Err(McpClientError::Remote(format!("unknown tool: {name}")));
            }
            Ok(ToolCallOutput::success(
                server
                    .tool_responses
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| json!({"tool": name, "arguments": arguments})),
            ))
        })
    }

    fn capability_changes(&self) -> Option<broadcast::Receiver<ToolListChanged>> {
        self.notifier.as_ref().map(broadcast::Sender::subscribe)
    }
}
