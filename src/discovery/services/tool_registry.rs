//! Hot-reloadable registry of node types derived from server tools.

use super::{ConversionContext, EventChannel, ServerRegistry, ServerRegistryError, ToolSchemaMapper};
use crate::discovery::{
    domain::{
        ChangeEvent, ConflictPolicy, NodeTypeDescriptor, NodeTypeName, RegistrationStatus,
        RegistryEvent, ServerDescriptor, ServerId, ToolCapability, ToolConflict, ToolKey,
        ToolRegistration, VersionStrategy,
    },
    ports::McpClientFactory,
};
use mockable::Clock;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors returned while registering tools.
#[derive(Debug, Error)]
pub enum ToolRegistryError {
    /// The name is taken by another server and the policy is `error`.
    #[error("tool `{tool_name}` from server {server_id} conflicts with server {existing_owner}")]
    Conflict {
        /// Server whose registration was rejected.
        server_id: ServerId,
        /// Contested tool name.
        tool_name: String,
        /// A server already publishing the name.
        existing_owner: ServerId,
    },

    /// The owning server could not be read.
    #[error(transparent)]
    Server(#[from] ServerRegistryError),
}

/// Result type for tool registry operations.
pub type ToolRegistryResult<T> = Result<T, ToolRegistryError>;

/// Errors returned when executing a node.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No registration carries the name.
    #[error("node type {0} is not registered")]
    NotFound(String),

    /// The owning server is not `connected`.
    #[error("node type {node_type_name} cannot run: server {server_id} is unavailable")]
    ServerUnavailable {
        /// Resolved node type.
        node_type_name: NodeTypeName,
        /// Owning server.
        server_id: ServerId,
        /// Underlying registry error.
        #[source]
        source: Box<ServerRegistryError>,
    },

    /// Required arguments were missing.
    #[error("node type {node_type_name} is missing required arguments: {}", .missing.join(", "))]
    InvalidArguments {
        /// Resolved node type.
        node_type_name: NodeTypeName,
        /// Names of the missing arguments.
        missing: Vec<String>,
    },

    /// The remote call failed; `message` is the server's text verbatim.
    #[error("node type {node_type_name} ({server_id}/{tool_name}) failed: {message}")]
    Remote {
        /// Resolved node type.
        node_type_name: NodeTypeName,
        /// Owning server.
        server_id: ServerId,
        /// Remote tool name.
        tool_name: String,
        /// Remote error message.
        message: String,
    },
}

/// What a single registration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationChange {
    /// A new registration was created.
    Registered,
    /// An existing registration was superseded.
    Updated,
    /// The capability was unchanged.
    Unchanged,
}

/// Result of registering one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Name of the registration.
    pub node_type_name: NodeTypeName,
    /// What happened.
    pub change: RegistrationChange,
    /// Change records produced.
    pub changes: Vec<ChangeEvent>,
}

/// Result of reconciling one server's capability set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Newly registered node types.
    pub registered: Vec<NodeTypeName>,
    /// Superseded node types.
    pub updated: Vec<NodeTypeName>,
    /// Node types left untouched.
    pub unchanged: Vec<NodeTypeName>,
    /// Node types removed because their tool disappeared.
    pub removed: Vec<NodeTypeName>,
    /// Tools that failed to register, with the reason.
    pub errors: Vec<(String, String)>,
    /// Change records produced, in order.
    #[serde(skip)]
    pub changes: Vec<ChangeEvent>,
}

impl BatchReport {
    /// Returns how many tools the server currently provides.
    #[must_use]
    pub fn discovered(&self) -> usize {
        self.registered
            .len()
            .saturating_add(self.updated.len())
            .saturating_add(self.unchanged.len())
    }
}

/// Successful node execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    /// Resolved node type.
    pub node_type_name: NodeTypeName,
    /// Owning server.
    pub server_id: ServerId,
    /// Remote tool name.
    pub tool_name: String,
    /// Content returned by the server.
    pub output: Value,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
}

#[derive(Default)]
struct RegistryState {
    registrations: HashMap<ToolKey, ToolRegistration>,
    by_name: HashMap<NodeTypeName, ToolKey>,
    conflicts: BTreeMap<String, ToolConflict>,
}

impl RegistryState {
    fn other_owners(&self, key: &ToolKey) -> BTreeSet<ServerId> {
        self.registrations
            .keys()
            .filter(|other| other.tool_name == key.tool_name && other.server_id != key.server_id)
            .map(|other| other.server_id.clone())
            .collect()
    }

    fn claim_name(&self, base: NodeTypeName) -> NodeTypeName {
        if !self.by_name.contains_key(&base) {
            return base;
        }
        let mut ordinal = 2_u32;
        loop {
            let candidate = base.with_suffix(&ordinal.to_string());
            if !self.by_name.contains_key(&candidate) {
                return candidate;
            }
            ordinal = ordinal.saturating_add(1);
        }
    }

    fn remove(&mut self, key: &ToolKey) -> Option<ToolRegistration> {
        let registration = self.registrations.remove(key)?;
        self.by_name.remove(registration.node_type_name());
        let now_settled = self
            .conflicts
            .get_mut(&key.tool_name)
            .is_some_and(|conflict| {
                conflict.remove_owner(&key.server_id);
                !conflict.is_active()
            });
        if now_settled {
            self.conflicts.remove(&key.tool_name);
        }
        Some(registration)
    }
}

/// Authoritative map from `(server, tool)` to node registrations.
///
/// Every mutation happens under one write lock with no suspension point,
/// so concurrent reconciliations of the same server only repeat work.
pub struct ToolRegistry<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    servers: Arc<ServerRegistry<F, C>>,
    mapper: ToolSchemaMapper,
    clock: Arc<C>,
    policy: ConflictPolicy,
    strategy: VersionStrategy,
    state: RwLock<RegistryState>,
    events: EventChannel<RegistryEvent>,
}

impl<F, C> ToolRegistry<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        servers: Arc<ServerRegistry<F, C>>,
        clock: Arc<C>,
        policy: ConflictPolicy,
        strategy: VersionStrategy,
        event_capacity: usize,
    ) -> Self {
        Self {
            servers,
            mapper: ToolSchemaMapper::default(),
            clock,
            policy,
            strategy,
            state: RwLock::new(RegistryState::default()),
            events: EventChannel::new(event_capacity),
        }
    }

    /// Replaces the schema mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: ToolSchemaMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Subscribes to registry events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Returns the configured conflict policy.
    #[must_use]
    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Reconciles registrations with a server's cached capabilities.
    ///
    /// Registrations whose tool disappeared are removed, then every cached
    /// capability is registered. One tool failing never aborts the rest.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Server`] when the server is unknown.
    pub fn register_server_tools(&self, server_id: &ServerId) -> ToolRegistryResult<BatchReport> {
        let connection = self
            .servers
            .connection(server_id)
            .ok_or_else(|| ServerRegistryError::NotFound(server_id.clone()))?;
        let capabilities = connection.capabilities();
        self.events.emit(RegistryEvent::BatchStarted {
            server_id: server_id.clone(),
            expected: capabilities.len(),
        });

        let mut report = BatchReport::default();
        let current: BTreeSet<&str> = capabilities.iter().map(ToolCapability::name).collect();
        let stale: Vec<ToolKey> = self
            .state
            .read()
            .registrations
            .keys()
            .filter(|key| &key.server_id == server_id && !current.contains(key.tool_name.as_str()))
            .cloned()
            .collect();
        for key in stale {
            if let Some((name, changes)) = self.remove_registration(&key) {
                report.removed.push(name);
                report.changes.extend(changes);
            }
        }

        for capability in capabilities {
            let registered = self.register_tool_recording(
                connection.descriptor(),
                capability,
                &mut report.changes,
            );
            match registered {
                Ok(outcome) => {
                    report.changes.extend(outcome.changes);
                    match outcome.change {
                        RegistrationChange::Registered => {
                            report.registered.push(outcome.node_type_name);
                        }
                        RegistrationChange::Updated => report.updated.push(outcome.node_type_name),
                        RegistrationChange::Unchanged => {
                            report.unchanged.push(outcome.node_type_name);
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        server_id = %server_id,
                        tool = capability.name(),
                        error = %err,
                        "tool registration failed"
                    );
                    report
                        .errors
                        .push((capability.name().to_owned(), err.to_string()));
                }
            }
        }

        self.events.emit(RegistryEvent::BatchCompleted {
            server_id: server_id.clone(),
            registered: report.registered.len(),
            updated: report.updated.len(),
            removed: report.removed.len(),
            errored: report.errors.len(),
        });
        Ok(report)
    }

    /// Registers or updates one tool of `server`.
    ///
    /// Unchanged capabilities are a no-op. A new tool whose name another
    /// server already publishes is resolved per the conflict policy. An
    /// update keeps its generated name and counters and bumps the version.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Conflict`] under the `error` policy; the
    /// registry is left untouched.
    pub fn register_tool(
        &self,
        server: &ServerDescriptor,
        capability: &ToolCapability,
    ) -> ToolRegistryResult<RegistrationOutcome> {
        self.register_tool_recording(server, capability, &mut Vec::new())
    }

    /// Registers one tool, appending the change record of a rejected
    /// conflict to `rejected`.
    fn register_tool_recording(
        &self,
        server: &ServerDescriptor,
        capability: &ToolCapability,
        rejected: &mut Vec<ChangeEvent>,
    ) -> ToolRegistryResult<RegistrationOutcome> {
        let key = ToolKey::new(server.id().clone(), capability.name());
        let fingerprint = capability.fingerprint();
        let mut events = Vec::new();

        let outcome = {
            let mut state = self.state.write();
            if let Some(existing) = state.registrations.get_mut(&key) {
                let node_type_name = existing.node_type_name().clone();
                if !existing.is_stale(&fingerprint) {
                    debug!(node_type = %node_type_name, "capability unchanged");
                    return Ok(RegistrationOutcome {
                        node_type_name,
                        change: RegistrationChange::Unchanged,
                        changes: Vec::new(),
                    });
                }
                let context = ConversionContext::for_server(server)
                    .with_node_type_name(node_type_name.clone());
                existing.supersede(
                    self.mapper.convert(capability, &context),
                    fingerprint,
                    self.strategy,
                    &*self.clock,
                );
                events.push(RegistryEvent::ToolUpdated {
                    server_id: key.server_id.clone(),
                    tool_name: key.tool_name.clone(),
                    node_type_name: node_type_name.clone(),
                    version: existing.version().to_string(),
                });
                info!(node_type = %node_type_name, version = %existing.version(), "tool updated");
                (node_type_name, RegistrationChange::Updated)
            } else {
                let owners = state.other_owners(&key);
                let base = if owners.is_empty() {
                    NodeTypeName::generate(key.server_id.as_str(), &key.tool_name)
                } else {
                    self.resolve_conflict(&key, &owners, rejected)?
                };
                let node_type_name = state.claim_name(base);
                let context = ConversionContext::for_server(server)
                    .with_node_type_name(node_type_name.clone());
                let registration = ToolRegistration::new(
                    key.clone(),
                    self.mapper.convert(capability, &context),
                    fingerprint,
                    self.strategy,
                    &*self.clock,
                );
                let version = registration.version().to_string();

                if !owners.is_empty() {
                    events.push(self.record_conflict(
                        &mut state,
                        &key,
                        &owners,
                        &node_type_name,
                    ));
                }
                state.by_name.insert(node_type_name.clone(), key.clone());
                state.registrations.insert(key.clone(), registration);
                events.push(RegistryEvent::ToolRegistered {
                    server_id: key.server_id.clone(),
                    tool_name: key.tool_name.clone(),
                    node_type_name: node_type_name.clone(),
                    version,
                });
                info!(node_type = %node_type_name, server_id = %key.server_id, "tool registered");
                (node_type_name, RegistrationChange::Registered)
            }
        };

        let changes = self.publish(events);
        Ok(RegistrationOutcome {
            node_type_name: outcome.0,
            change: outcome.1,
            changes,
        })
    }

    /// Removes one registration.
    ///
    /// Returns the change records, empty when nothing was registered.
    pub fn unregister_tool(&self, server_id: &ServerId, tool_name: &str) -> Vec<ChangeEvent> {
        self.remove_registration(&ToolKey::new(server_id.clone(), tool_name))
            .map(|(_, changes)| changes)
            .unwrap_or_default()
    }

    /// Removes every registration of a server.
    pub fn unregister_server_tools(&self, server_id: &ServerId) -> Vec<ChangeEvent> {
        let keys: Vec<ToolKey> = self
            .state
            .read()
            .registrations
            .keys()
            .filter(|key| &key.server_id == server_id)
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.remove_registration(key))
            .flat_map(|(_, changes)| changes)
            .collect()
    }

    /// Executes a node by its generated name.
    ///
    /// The call is counted before dispatch. Unknown names fail without
    /// touching any registration.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the name is unknown, required
    /// arguments are missing, the server is unavailable, or the remote call
    /// fails.
    pub async fn execute_tool(
        &self,
        node_type_name: &str,
        arguments: Value,
    ) -> Result<ToolExecution, ExecutionError> {
        let (key, resolved_name, missing) = {
            let mut state = self.state.write();
            let key = state
                .by_name
                .get(node_type_name)
                .cloned()
                .ok_or_else(|| ExecutionError::NotFound(node_type_name.to_owned()))?;
            let registration = state
                .registrations
                .get_mut(&key)
                .ok_or_else(|| ExecutionError::NotFound(node_type_name.to_owned()))?;
            registration.record_call_started(&*self.clock);
            (
                key,
                registration.node_type_name().clone(),
                missing_required(registration.descriptor(), &arguments),
            )
        };

        if !missing.is_empty() {
            let failure = ExecutionError::InvalidArguments {
                node_type_name: resolved_name.clone(),
                missing,
            };
            self.record_failure(&key, &resolved_name, &failure);
            return Err(failure);
        }

        let started = Instant::now();
        let dispatched = self
            .servers
            .call_tool(&key.server_id, &key.tool_name, arguments)
            .await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let failure = match dispatched {
            Ok(output) if !output.is_error => {
                if let Some(registration) = self.state.write().registrations.get_mut(&key) {
                    registration.record_success(latency_ms);
                }
                self.events.emit(RegistryEvent::ToolExecuted {
                    node_type_name: resolved_name.clone(),
                    latency_ms,
                });
                debug!(node_type = %resolved_name, latency_ms, "tool executed");
                return Ok(ToolExecution {
                    node_type_name: resolved_name,
                    server_id: key.server_id,
                    tool_name: key.tool_name,
                    output: output.content,
                    latency_ms,
                });
            }
            Ok(output) => ExecutionError::Remote {
                node_type_name: resolved_name.clone(),
                server_id: key.server_id.clone(),
                tool_name: key.tool_name.clone(),
                message: output.message(),
            },
            Err(ServerRegistryError::Client { source, .. }) => ExecutionError::Remote {
                node_type_name: resolved_name.clone(),
                server_id: key.server_id.clone(),
                tool_name: key.tool_name.clone(),
                message: source.message(),
            },
            Err(err) => ExecutionError::ServerUnavailable {
                node_type_name: resolved_name.clone(),
                server_id: key.server_id.clone(),
                source: Box::new(err),
            },
        };
        self.record_failure(&key, &resolved_name, &failure);
        Err(failure)
    }

    /// Returns every registration ordered by generated name.
    #[must_use]
    pub fn all_tool_metadata(&self) -> Vec<ToolRegistration> {
        let mut registrations: Vec<_> = self.state.read().registrations.values().cloned().collect();
        registrations.sort_by(|left, right| left.node_type_name().cmp(right.node_type_name()));
        registrations
    }

    /// Returns the registrations of one server, or of all servers.
    #[must_use]
    pub fn registrations(&self, server_id: Option<&ServerId>) -> Vec<ToolRegistration> {
        self.all_tool_metadata()
            .into_iter()
            .filter(|registration| {
                server_id.is_none_or(|wanted| &registration.key().server_id == wanted)
            })
            .collect()
    }

    /// Returns descriptors of one server, or of all servers.
    #[must_use]
    pub fn descriptors(&self, server_id: Option<&ServerId>) -> Vec<NodeTypeDescriptor> {
        self.registrations(server_id)
            .into_iter()
            .map(|registration| registration.descriptor().clone())
            .collect()
    }

    /// Looks a registration up by generated name.
    #[must_use]
    pub fn registration(&self, node_type_name: &str) -> Option<ToolRegistration> {
        let state = self.state.read();
        state
            .by_name
            .get(node_type_name)
            .and_then(|key| state.registrations.get(key))
            .cloned()
    }

    /// Returns outstanding conflicts ordered by tool name.
    #[must_use]
    pub fn conflicts(&self) -> Vec<ToolConflict> {
        self.state.read().conflicts.values().cloned().collect()
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().registrations.len()
    }

    /// Returns whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().registrations.is_empty()
    }

    /// Sets a registration's lifecycle status.
    ///
    /// Returns `false` when the name is unknown.
    pub fn set_tool_status(&self, node_type_name: &str, status: RegistrationStatus) -> bool {
        let mut state = self.state.write();
        let Some(key) = state.by_name.get(node_type_name).cloned() else {
            return false;
        };
        let Some(registration) = state.registrations.get_mut(&key) else {
            return false;
        };
        registration.set_status(status);
        true
    }

    /// Sets the status of a server's registrations, leaving deprecated ones.
    ///
    /// Returns the number of registrations changed.
    pub fn set_server_status(&self, server_id: &ServerId, status: RegistrationStatus) -> usize {
        let mut state = self.state.write();
        let mut changed = 0_usize;
        for registration in state.registrations.values_mut().filter(|registration| {
            &registration.key().server_id == server_id
                && registration.status() != RegistrationStatus::Deprecated
                && registration.status() != status
        }) {
            registration.set_status(status);
            changed = changed.saturating_add(1);
        }
        changed
    }

    /// Drops every registration and conflict without emitting events.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.registrations.clear();
        state.by_name.clear();
        state.conflicts.clear();
    }

    fn resolve_conflict(
        &self,
        key: &ToolKey,
        owners: &BTreeSet<ServerId>,
        rejected: &mut Vec<ChangeEvent>,
    ) -> ToolRegistryResult<NodeTypeName> {
        let base = NodeTypeName::generate(key.server_id.as_str(), &key.tool_name);
        match self.policy {
            ConflictPolicy::Prefix | ConflictPolicy::Manual => Ok(base),
            ConflictPolicy::Version => {
                let position = owners
                    .iter()
                    .filter(|owner| *owner < &key.server_id)
                    .count()
                    .saturating_add(1);
                Ok(base.with_suffix(&format!("v{position}")))
            }
            ConflictPolicy::Error => {
                let mut all_owners = owners.clone();
                all_owners.insert(key.server_id.clone());
                rejected.extend(self.publish(vec![RegistryEvent::ToolConflict {
                    server_id: key.server_id.clone(),
                    tool_name: key.tool_name.clone(),
                    owners: all_owners,
                    strategy: self.policy.as_str().to_owned(),
                    resolved_name: None,
                }]));
                let existing_owner = owners
                    .iter()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| key.server_id.clone());
                warn!(
                    tool = %key.tool_name,
                    server_id = %key.server_id,
                    existing_owner = %existing_owner,
                    "tool name conflict rejected"
                );
                Err(ToolRegistryError::Conflict {
                    server_id: key.server_id.clone(),
                    tool_name: key.tool_name.clone(),
                    existing_owner,
                })
            }
        }
    }

    fn record_conflict(
        &self,
        state: &mut RegistryState,
        key: &ToolKey,
        owners: &BTreeSet<ServerId>,
        node_type_name: &NodeTypeName,
    ) -> RegistryEvent {
        let resolves_names = self.policy != ConflictPolicy::Manual;
        let owner_names: Vec<(ServerId, Option<NodeTypeName>)> = owners
            .iter()
            .map(|owner| {
                let name = state
                    .registrations
                    .get(&ToolKey::new(owner.clone(), key.tool_name.clone()))
                    .map(|registration| registration.node_type_name().clone());
                (owner.clone(), name.filter(|_| resolves_names))
            })
            .collect();

        let detected_at = self.clock.utc();
        let conflict = state
            .conflicts
            .entry(key.tool_name.clone())
            .or_insert_with(|| ToolConflict::new(key.tool_name.clone(), self.policy, detected_at));
        for (owner, name) in owner_names {
            conflict.add_owner(owner, name);
        }
        let resolved_name = resolves_names.then(|| node_type_name.clone());
        conflict.add_owner(key.server_id.clone(), resolved_name.clone());
        warn!(
            tool = %key.tool_name,
            owners = conflict.owners().len(),
            policy = %self.policy,
            "tool name published by several servers"
        );

        RegistryEvent::ToolConflict {
            server_id: key.server_id.clone(),
            tool_name: key.tool_name.clone(),
            owners: conflict.owners().clone(),
            strategy: self.policy.as_str().to_owned(),
            resolved_name,
        }
    }

    fn remove_registration(&self, key: &ToolKey) -> Option<(NodeTypeName, Vec<ChangeEvent>)> {
        let removed = self.state.write().remove(key)?;
        let node_type_name = removed.node_type_name().clone();
        info!(node_type = %node_type_name, server_id = %key.server_id, "tool unregistered");
        let changes = self.publish(vec![RegistryEvent::ToolUnregistered {
            server_id: key.server_id.clone(),
            tool_name: key.tool_name.clone(),
            node_type_name: node_type_name.clone(),
        }]);
        Some((node_type_name, changes))
    }

    fn record_failure(
        &self,
        key: &ToolKey,
        node_type_name: &NodeTypeName,
        failure: &ExecutionError,
    ) {
        if let Some(registration) = self.state.write().registrations.get_mut(key) {
            registration.record_failure(failure.to_string());
        }
        warn!(node_type = %node_type_name, error = %failure, "tool execution failed");
        self.events.emit(RegistryEvent::ToolExecutionFailed {
            node_type_name: node_type_name.clone(),
            error: failure.to_string(),
        });
    }

    fn publish(&self, events: Vec<RegistryEvent>) -> Vec<ChangeEvent> {
        let occurred_at = self.clock.utc();
        events
            .into_iter()
            .filter_map(|event| {
                let change = ChangeEvent::from_registry_event(&event, occurred_at);
                self.events.emit(event);
                change
            })
            .collect()
    }
}

fn missing_required(descriptor: &NodeTypeDescriptor, arguments: &Value) -> Vec<String> {
    descriptor
        .visible_properties()
        .filter(|property| property.required)
        .filter(|property| arguments.get(&property.name).is_none_or(Value::is_null))
        .map(|property| property.name.clone())
        .collect()
}
