//! Remote client port for capability-providing servers.

use crate::discovery::domain::ServerDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Result type for remote client operations.
pub type McpClientResult<T> = Result<T, McpClientError>;

/// Signal that a server's tool list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolListChanged;

/// Payload returned by a remote tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallOutput {
    /// Result content as returned by the server.
    pub content: Value,
    /// Whether the server flagged the result as a tool-level error.
    pub is_error: bool,
}

impl ToolCallOutput {
    /// Creates a successful output.
    #[must_use]
    pub const fn success(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Creates an output the server flagged as an error.
    #[must_use]
    pub const fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Extracts a human-readable message from the content.
    ///
    /// Plain strings are returned as-is, the first text block of a
    /// `content` array is preferred next, and anything else is rendered as
    /// JSON.
    #[must_use]
    pub fn message(&self) -> String {
        if let Some(text) = self.content.as_str() {
            return text.to_owned();
        }
        self.content
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.iter().find_map(|block| block.get("text")))
            .and_then(Value::as_str)
            .map_or_else(|| self.content.to_string(), str::to_owned)
    }
}

/// Connection to one capability-providing server.
///
/// Capability listings are returned as raw JSON; malformed entries are
/// skipped by the caller.
#[async_trait]
pub trait McpServerClient: Send + Sync {
    /// Opens the transport and waits for the server's acknowledgement.
    async fn connect(&self) -> McpClientResult<()>;

    /// Closes the transport. Closing an already-closed handle succeeds.
    async fn disconnect(&self) -> McpClientResult<()>;

    /// Lists the tools the server currently declares.
    async fn list_capabilities(&self) -> McpClientResult<Vec<Value>>;

    /// Invokes a tool by its remote name.
    async fn call_tool(&self, name: &str, arguments: Value) -> McpClientResult<ToolCallOutput>;

    /// Subscribes to tool-list change notifications, when the transport
    /// supports push.
    fn capability_changes(&self) -> Option<broadcast::Receiver<ToolListChanged>>;
}

/// Builds clients from server descriptors.
pub trait McpClientFactory: Send + Sync {
    /// Creates an unconnected client for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError`] when the transport cannot be set up.
    fn create(&self, descriptor: &ServerDescriptor) -> McpClientResult<Arc<dyn McpServerClient>>;
}

/// Errors returned by remote client adapters.
#[derive(Debug, Clone, Error)]
pub enum McpClientError {
    /// The transport failed; the connection is no longer usable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with an error.
    #[error("{0}")]
    Remote(String),

    /// Generic adapter failure.
    #[error("MCP client runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl McpClientError {
    /// Wraps a runtime error from the client adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Returns whether the failure invalidates the connection.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the underlying message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Transport(message) | Self::Remote(message) => message.clone(),
            Self::Runtime(err) => err.to_string(),
        }
    }
}
