//! JSON meta-operations exposed to the host tool-registration surface.

use super::{CoordinatorError, DiscoveryCoordinator, NodeTypeQuery};
use crate::discovery::{
    domain::{DiscoveryDomainError, McpTransport, ServerDescriptor, ServerId},
    ports::McpClientFactory,
};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Name and summary of one meta-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    /// Value of the `operation` tag.
    pub name: &'static str,
    /// Summary for the host surface.
    pub description: &'static str,
}

const CATALOG: &[OperationDescriptor] = &[
    OperationDescriptor {
        name: "register_server",
        description: "Register a capability-providing server and discover its tools",
    },
    OperationDescriptor {
        name: "unregister_server",
        description: "Stop syncing a server and remove its node types",
    },
    OperationDescriptor {
        name: "list_node_types",
        description: "List discovered node types, optionally for one server and with metadata",
    },
    OperationDescriptor {
        name: "execute_node",
        description: "Execute a discovered node type by its generated name",
    },
    OperationDescriptor {
        name: "sync_status",
        description: "Report synchronization status for one server or all servers",
    },
    OperationDescriptor {
        name: "force_sync",
        description: "Resynchronize a server's capabilities immediately",
    },
    OperationDescriptor {
        name: "metrics",
        description: "Report aggregate metrics, conflicts and optional recent changes",
    },
];

/// Lists the meta-operations in dispatch order.
#[must_use]
pub const fn operation_catalog() -> &'static [OperationDescriptor] {
    CATALOG
}

const fn enabled_by_default() -> bool {
    true
}

/// A host request, tagged by `operation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationRequest {
    /// Register and connect a server.
    RegisterServer {
        /// Unique server id.
        server_id: String,
        /// Human-readable name; defaults to the id.
        #[serde(default)]
        display_name: String,
        /// How to reach the server.
        transport: McpTransport,
        /// Whether to connect immediately.
        #[serde(default = "enabled_by_default")]
        enabled: bool,
    },
    /// Unregister a server.
    UnregisterServer {
        /// Server to remove.
        server_id: String,
    },
    /// List discovered node types.
    ListNodeTypes {
        /// Restrict to one server.
        #[serde(default)]
        server_id: Option<String>,
        /// Attach registration metadata.
        #[serde(default)]
        include_metadata: bool,
    },
    /// Execute a node type.
    ExecuteNode {
        /// Generated node type name.
        node_type_name: String,
        /// Tool arguments.
        #[serde(default)]
        arguments: Value,
    },
    /// Report sync status.
    SyncStatus {
        /// Restrict to one server.
        #[serde(default)]
        server_id: Option<String>,
    },
    /// Resync a server now.
    ForceSync {
        /// Server to resync.
        server_id: String,
    },
    /// Report metrics and conflicts.
    Metrics {
        /// Number of recent changes to include.
        #[serde(default)]
        recent_changes: Option<usize>,
    },
}

/// Errors returned by [`DiscoveryOperations`].
#[derive(Debug, Error)]
pub enum OperationError {
    /// The request is not a known operation or is missing fields.
    #[error("invalid operation request: {0}")]
    InvalidRequest(#[source] serde_json::Error),

    /// A request field failed validation.
    #[error(transparent)]
    Domain(#[from] DiscoveryDomainError),

    /// The engine rejected the operation.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// The response could not be encoded.
    #[error("failed to encode operation response: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Dispatches host requests to a [`DiscoveryCoordinator`].
pub struct DiscoveryOperations<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    coordinator: Arc<DiscoveryCoordinator<F, C>>,
}

impl<F, C> DiscoveryOperations<F, C>
where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Wraps a coordinator.
    #[must_use]
    pub const fn new(coordinator: Arc<DiscoveryCoordinator<F, C>>) -> Self {
        Self { coordinator }
    }

    /// Parses and dispatches a JSON request.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidRequest`] when the document is not a
    /// known operation, otherwise whatever [`Self::handle`] returns.
    pub async fn handle_json(&self, raw: &str) -> Result<Value, OperationError> {
        let request: OperationRequest =
            serde_json::from_str(raw).map_err(OperationError::InvalidRequest)?;
        self.handle(request).await
    }

    /// Dispatches a request and returns its JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Domain`] for invalid ids or transports and
    /// [`OperationError::Coordinator`] when the engine rejects the request.
    pub async fn handle(&self, request: OperationRequest) -> Result<Value, OperationError> {
        match request {
            OperationRequest::RegisterServer {
                server_id,
                display_name,
                transport,
                enabled,
            } => {
                transport.validate()?;
                let descriptor =
                    ServerDescriptor::new(ServerId::new(server_id)?, display_name, transport)
                        .with_enabled(enabled);
                debug!(server_id = %descriptor.id(), "register_server requested");
                let registered = self.coordinator.register_server(descriptor).await?;
                encode(&registered)
            }
            OperationRequest::UnregisterServer { server_id } => {
                let id = ServerId::new(server_id)?;
                let removed = self.coordinator.unregister_server(&id).await;
                Ok(json!({ "serverId": id, "removed": removed }))
            }
            OperationRequest::ListNodeTypes {
                server_id,
                include_metadata,
            } => {
                let query = NodeTypeQuery {
                    server_id: server_id.map(ServerId::new).transpose()?,
                    include_metadata,
                };
                let listings = self.coordinator.list_node_types(&query);
                Ok(json!({
                    "count": listings.len(),
                    "nodeTypes": encode(&listings)?,
                }))
            }
            OperationRequest::ExecuteNode {
                node_type_name,
                arguments,
            } => {
                let normalized = if arguments.is_null() {
                    json!({})
                } else {
                    arguments
                };
                let result = self
                    .coordinator
                    .execute_tool(&node_type_name, normalized)
                    .await?;
                encode(&result)
            }
            OperationRequest::SyncStatus { server_id } => {
                let id = server_id.map(ServerId::new).transpose()?;
                let statuses = self.coordinator.synchronization_status(id.as_ref());
                Ok(json!({ "servers": encode(&statuses)? }))
            }
            OperationRequest::ForceSync { server_id } => {
                let id = ServerId::new(server_id)?;
                let report = self.coordinator.force_synchronization(&id).await?;
                Ok(json!({ "serverId": id, "report": encode(&report)? }))
            }
            OperationRequest::Metrics { recent_changes } => {
                let mut response = json!({
                    "metrics": encode(&self.coordinator.metrics())?,
                    "conflicts": encode(&self.coordinator.conflicts())?,
                });
                if let (Some(limit), Some(object)) = (recent_changes, response.as_object_mut()) {
                    object.insert(
                        "recentChanges".to_owned(),
                        encode(&self.coordinator.recent_changes(limit))?,
                    );
                }
                Ok(response)
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, OperationError> {
    serde_json::to_value(value).map_err(OperationError::Serialization)
}
