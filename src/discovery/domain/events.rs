//! Typed lifecycle events and the bounded change log.

use super::{ChangeEventId, NodeTypeName, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Events emitted by the server registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A server acknowledged its connection.
    ServerConnected {
        /// Server identifier.
        server_id: ServerId,
        /// Names of the tools it declared.
        capabilities: Vec<String>,
    },
    /// A server's transport handle was closed.
    ServerDisconnected {
        /// Server identifier.
        server_id: ServerId,
        /// Why it was closed.
        reason: String,
    },
    /// A server moved to `error`.
    ServerError {
        /// Server identifier.
        server_id: ServerId,
        /// Failure description.
        error: String,
    },
    /// A server's cached capability set was refreshed.
    CapabilitiesUpdated {
        /// Server identifier.
        server_id: ServerId,
        /// Number of capabilities now cached.
        tool_count: usize,
    },
}

impl ServerEvent {
    /// Returns the server the event concerns.
    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        match self {
            Self::ServerConnected { server_id, .. }
            | Self::ServerDisconnected { server_id, .. }
            | Self::ServerError { server_id, .. }
            | Self::CapabilitiesUpdated { server_id, .. } => server_id,
        }
    }
}

/// Events emitted by the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RegistryEvent {
    /// A tool was registered for the first time.
    ToolRegistered {
        /// Server identifier.
        server_id: ServerId,
        /// Remote tool name.
        tool_name: String,
        /// Generated node type name.
        node_type_name: NodeTypeName,
        /// Version tag.
        version: String,
    },
    /// An existing registration was superseded.
    ToolUpdated {
        /// Server identifier.
        server_id: ServerId,
        /// Remote tool name.
        tool_name: String,
        /// Generated node type name.
        node_type_name: NodeTypeName,
        /// New version tag.
        version: String,
    },
    /// A registration was removed.
    ToolUnregistered {
        /// Server identifier.
        server_id: ServerId,
        /// Remote tool name.
        tool_name: String,
        /// Generated node type name.
        node_type_name: NodeTypeName,
    },
    /// Two or more servers publish the same tool name.
    ToolConflict {
        /// Server identifier of the registration that hit the conflict.
        server_id: ServerId,
        /// Contested tool name.
        tool_name: String,
        /// All servers publishing the name.
        owners: BTreeSet<ServerId>,
        /// Applied policy.
        strategy: String,
        /// Resolved name for `server_id`, when one was produced.
        resolved_name: Option<NodeTypeName>,
    },
    /// A batch registration for one server started.
    BatchStarted {
        /// Server identifier.
        server_id: ServerId,
        /// Number of capabilities about to be processed.
        expected: usize,
    },
    /// A batch registration for one server finished.
    BatchCompleted {
        /// Server identifier.
        server_id: ServerId,
        /// Newly registered tools.
        registered: usize,
        /// Updated tools.
        updated: usize,
        /// Removed stale tools.
        removed: usize,
        /// Tools that failed to register.
        errored: usize,
    },
    /// A tool call completed.
    ToolExecuted {
        /// Generated node type name.
        node_type_name: NodeTypeName,
        /// Latency in milliseconds.
        latency_ms: u64,
    },
    /// A tool call failed.
    ToolExecutionFailed {
        /// Generated node type name.
        node_type_name: NodeTypeName,
        /// Failure message.
        error: String,
    },
}

/// Events emitted by the capability synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// A sync round finished.
    SyncCompleted {
        /// Server identifier.
        server_id: ServerId,
        /// What started the round.
        trigger: SyncTrigger,
        /// Number of changes recorded.
        changes: usize,
    },
    /// A sync round failed.
    SyncError {
        /// Server identifier.
        server_id: ServerId,
        /// What started the round.
        trigger: SyncTrigger,
        /// Failure description.
        error: String,
        /// Failures since the last success.
        consecutive_failures: u32,
    },
}

/// What started a sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Fixed-interval poll.
    Poll,
    /// Capability-change notification from the server.
    Push,
    /// Operator request.
    Manual,
    /// Coordinator discovery round.
    Discovery,
    /// Initial reconciliation right after a server connected.
    Registration,
}

/// Kind of a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Tool registered.
    Registered,
    /// Tool updated.
    Updated,
    /// Tool unregistered.
    Unregistered,
    /// Tool name conflict observed.
    Conflict,
}

/// Append-only record of a registry change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Unique identifier.
    pub id: ChangeEventId,
    /// Server identifier.
    pub server_id: ServerId,
    /// Change kind.
    pub kind: ChangeKind,
    /// Remote tool name.
    pub tool_name: String,
    /// Generated node type name, when one exists.
    pub node_type_name: Option<NodeTypeName>,
    /// Version after the change, when applicable.
    pub version: Option<String>,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Derives a change record from a registry event.
    ///
    /// Batch and execution events are not changes and yield `None`.
    #[must_use]
    pub fn from_registry_event(event: &RegistryEvent, occurred_at: DateTime<Utc>) -> Option<Self> {
        let (server_id, kind, tool_name, node_type_name, version) = match event {
            RegistryEvent::ToolRegistered {
                server_id,
                tool_name,
                node_type_name,
                version,
            } => (
                server_id,
                ChangeKind::Registered,
                tool_name,
                Some(node_type_name),
                Some(version),
            ),
            RegistryEvent::ToolUpdated {
                server_id,
                tool_name,
                node_type_name,
                version,
            } => (
                server_id,
                ChangeKind::Updated,
                tool_name,
                Some(node_type_name),
                Some(version),
            ),
            RegistryEvent::ToolUnregistered {
                server_id,
                tool_name,
                node_type_name,
            } => (
                server_id,
                ChangeKind::Unregistered,
                tool_name,
                Some(node_type_name),
                None,
            ),
            RegistryEvent::ToolConflict {
                server_id,
                tool_name,
                resolved_name,
                ..
            } => (
                server_id,
                ChangeKind::Conflict,
                tool_name,
                resolved_name.as_ref(),
                None,
            ),
            RegistryEvent::BatchStarted { .. }
            | RegistryEvent::BatchCompleted { .. }
            | RegistryEvent::ToolExecuted { .. }
            | RegistryEvent::ToolExecutionFailed { .. } => return None,
        };

        Some(Self {
            id: ChangeEventId::new(),
            server_id: server_id.clone(),
            kind,
            tool_name: tool_name.clone(),
            node_type_name: node_type_name.cloned(),
            version: version.cloned(),
            occurred_at,
        })
    }
}

/// Ring of the most recent change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLog {
    capacity: usize,
    entries: VecDeque<ChangeEvent>,
}

impl ChangeLog {
    /// Creates an empty ring holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Appends an entry, evicting the oldest when full.
    pub fn push(&mut self, event: ChangeEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Returns up to `limit` entries, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<ChangeEvent> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Returns every retained entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<ChangeEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Returns the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
