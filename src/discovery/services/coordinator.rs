//! Top-level orchestration of the discovery engine.

use super::{
    BatchReport, CapabilitySynchronizer, ExecutionError, ServerRegistry, ServerRegistryError,
    SynchronizationError, SynchronizationStatus, ToolRegistry, ToolRegistryError,
};
use crate::discovery::{
    config::DiscoveryConfig,
    domain::{
        ChangeEvent, ConnectionState, NodeTypeDescriptor, NodeTypeName, RegistrationStatus,
        RegistryEvent, ServerConnection, ServerDescriptor, ServerEvent, ServerId, SyncEvent,
        SyncTrigger, ToolConflict, ToolRegistration,
    },
    ports::McpClientFactory,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PERMILLE: u64 = 1_000;
const SMOOTHING_WEIGHT: u64 = 9;
const SMOOTHING_SPAN: u64 = 10;

/// Errors surfaced to callers of the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Server lifecycle failure.
    #[error(transparent)]
    Server(#[from] ServerRegistryError),

    /// Registration failure.
    #[error(transparent)]
    Registry(#[from] ToolRegistryError),

    /// Node execution failure.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Sync round failure.
    #[error(transparent)]
    Synchronization(#[from] SynchronizationError),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Outcome of registering a server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredServer {
    /// Connection snapshot after registration.
    pub connection: ServerConnection,
    /// Initial reconciliation, absent for disabled servers.
    pub report: Option<BatchReport>,
}

/// Metadata attached to every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Unique identifier of this execution.
    pub execution_id: Uuid,
    /// Resolved node type.
    pub node_type_name: NodeTypeName,
    /// Owning server.
    pub server_id: ServerId,
    /// Remote tool name.
    pub tool_name: String,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Successful execution with its context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Execution metadata.
    pub context: ExecutionContext,
    /// Content returned by the server.
    pub output: Value,
}

/// Aggregate counts from one discovery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRoundReport {
    /// Connected servers visited.
    pub servers_scanned: usize,
    /// Tools currently provided by the visited servers.
    pub tools_discovered: usize,
    /// Failed rounds plus per-tool registration failures.
    pub errors: usize,
}

/// Filter for [`DiscoveryCoordinator::list_node_types`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeTypeQuery {
    /// Restrict to one server.
    pub server_id: Option<ServerId>,
    /// Attach registration metadata.
    pub include_metadata: bool,
}

/// One discovered node type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeListing {
    /// Display-ready descriptor.
    pub descriptor: NodeTypeDescriptor,
    /// Registration metadata, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolRegistration>,
}

/// Aggregate engine metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMetrics {
    /// Registered servers.
    pub servers: usize,
    /// Servers in `connected` state.
    pub connected_servers: usize,
    /// Registered node types.
    pub tools: usize,
    /// Outstanding conflicts.
    pub conflicts: usize,
    /// Executions attempted.
    pub executions: u64,
    /// Executions that failed.
    pub failed_executions: u64,
    /// Smoothed response time of successful executions.
    pub average_response_ms: u64,
    /// Decaying error rate in parts per thousand.
    pub error_rate_permille: u64,
    /// Discovery rounds completed.
    pub discovery_rounds: u64,
    /// When the last discovery round finished.
    pub last_discovery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ExecutionStats {
    executions: u64,
    failed_executions: u64,
    average_response_ms: u64,
    error_rate_permille: u64,
    discovery_rounds: u64,
    last_discovery_at: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    fn record(&mut self, succeeded_in_ms: Option<u64>) {
        self.executions = self.executions.saturating_add(1);
        let failure_sample = match succeeded_in_ms {
            Some(latency_ms) => {
                self.average_response_ms = if self.executions == 1 {
                    latency_ms
                } else {
                    smooth(self.average_response_ms, latency_ms)
                };
                0
            }
            None => {
                self.failed_executions = self.failed_executions.saturating_add(1);
                PERMILLE
            }
        };
        self.error_rate_permille = smooth(self.error_rate_permille, failure_sample);
    }
}

fn smooth(previous: u64, sample: u64) -> u64 {
    previous
        .saturating_mul(SMOOTHING_WEIGHT)
        .saturating_add(sample)
        .checked_div(SMOOTHING_SPAN)
        .unwrap_or(sample)
}

struct Background {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Wires the discovery components together and exposes the host-facing API.
///
/// Call [`DiscoveryCoordinator::start`] to run the background event pump
/// and the optional discovery loop, and [`DiscoveryCoordinator::cleanup`]
/// to tear everything down.
pub struct DiscoveryCoordinator<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    config: DiscoveryConfig,
    clock: Arc<C>,
    servers: Arc<ServerRegistry<F, C>>,
    tools: Arc<ToolRegistry<F, C>>,
    synchronizer: Arc<CapabilitySynchronizer<F, C>>,
    stats: Mutex<ExecutionStats>,
    background: Mutex<Option<Background>>,
}

impl<F, C> DiscoveryCoordinator<F, C>
where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Builds the engine from a configuration, client factory and clock.
    #[must_use]
    pub fn new(config: DiscoveryConfig, factory: Arc<F>, clock: Arc<C>) -> Self {
        let servers = Arc::new(ServerRegistry::new(
            factory,
            Arc::clone(&clock),
            config.event_capacity,
        ));
        let tools = Arc::new(ToolRegistry::new(
            Arc::clone(&servers),
            Arc::clone(&clock),
            config.conflict_policy,
            config.version_strategy,
            config.event_capacity,
        ));
        let synchronizer = Arc::new(CapabilitySynchronizer::new(
            Arc::clone(&servers),
            Arc::clone(&tools),
            Arc::clone(&clock),
            &config,
        ));
        Self {
            config,
            clock,
            servers,
            tools,
            synchronizer,
            stats: Mutex::new(ExecutionStats::default()),
            background: Mutex::new(None),
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Returns the server registry.
    #[must_use]
    pub const fn servers(&self) -> &Arc<ServerRegistry<F, C>> {
        &self.servers
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn tools(&self) -> &Arc<ToolRegistry<F, C>> {
        &self.tools
    }

    /// Returns the synchronizer.
    #[must_use]
    pub const fn synchronizer(&self) -> &Arc<CapabilitySynchronizer<F, C>> {
        &self.synchronizer
    }

    /// Starts the server event pump and, when configured, the discovery loop.
    ///
    /// The pump marks a server's registrations `inactive` when it errors or
    /// disconnects and `active` again when it reconnects. Calling this twice
    /// is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut background = self.background.lock();
        if background.is_some() {
            debug!("coordinator already started");
            return;
        }
        let token = CancellationToken::new();
        let mut tasks = vec![tokio::spawn(status_pump(
            Arc::clone(&self.tools),
            self.servers.subscribe(),
            token.child_token(),
        ))];
        if let Some(period) = self.config.discovery_interval() {
            tasks.push(tokio::spawn(discovery_loop(
                Arc::downgrade(self),
                period,
                token.child_token(),
            )));
        }
        *background = Some(Background { token, tasks });
        info!(
            discovery_interval_secs = self.config.discovery_interval_secs,
            "discovery coordinator started"
        );
    }

    /// Registers a server, reconciles its tools and schedules its sync.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Server`] when the id is taken or the
    /// connection fails, and [`CoordinatorError::Synchronization`] when the
    /// initial reconciliation fails.
    pub async fn register_server(
        &self,
        descriptor: ServerDescriptor,
    ) -> CoordinatorResult<RegisteredServer> {
        let server_id = descriptor.id().clone();
        let registered = self.servers.register(descriptor).await?;
        if registered.state() != ConnectionState::Connected {
            info!(
                server_id = %server_id,
                state = %registered.state(),
                "server registered without connecting"
            );
            return Ok(RegisteredServer {
                connection: registered,
                report: None,
            });
        }

        let report = self
            .synchronizer
            .reconcile(&server_id, SyncTrigger::Registration)
            .await?;
        self.synchronizer.start_synchronization(&server_id);
        let connection = self.servers.connection(&server_id).unwrap_or(registered);
        Ok(RegisteredServer {
            connection,
            report: Some(report),
        })
    }

    /// Stops a server's sync, removes its tools and disconnects it.
    ///
    /// Returns `false` when the server was not registered.
    pub async fn unregister_server(&self, server_id: &ServerId) -> bool {
        self.synchronizer
            .retire_server(server_id, async {
                let changes = self.tools.unregister_server_tools(server_id);
                self.synchronizer.record_changes(&changes);
                self.servers
                    .unregister(server_id, "unregistered by operator")
                    .await
                    .is_some()
            })
            .await
    }

    /// Executes a node and wraps the output with execution metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Execution`] when the name is unknown,
    /// arguments are missing, or the remote call fails.
    pub async fn execute_tool(
        &self,
        node_type_name: &str,
        arguments: Value,
    ) -> CoordinatorResult<ExecutionResult> {
        let execution_id = Uuid::new_v4();
        let started_at = self.clock.utc();
        let started = Instant::now();
        let outcome = self.tools.execute_tool(node_type_name, arguments).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(execution) => {
                self.stats.lock().record(Some(execution.latency_ms));
                Ok(ExecutionResult {
                    context: ExecutionContext {
                        execution_id,
                        node_type_name: execution.node_type_name,
                        server_id: execution.server_id,
                        tool_name: execution.tool_name,
                        started_at,
                        elapsed_ms,
                    },
                    output: execution.output,
                })
            }
            Err(err) => {
                self.stats.lock().record(None);
                debug!(%execution_id, node_type = node_type_name, elapsed_ms, "execution failed");
                Err(err.into())
            }
        }
    }

    /// Runs a sync round on every connected server.
    ///
    /// Failures are counted in the report and never abort the round.
    pub async fn perform_discovery_round(&self) -> DiscoveryRoundReport {
        let mut report = DiscoveryRoundReport::default();
        for server_id in self.servers.connected_server_ids() {
            report.servers_scanned = report.servers_scanned.saturating_add(1);
            match self
                .synchronizer
                .run_round(&server_id, SyncTrigger::Discovery)
                .await
            {
                Ok(batch) => {
                    report.tools_discovered =
                        report.tools_discovered.saturating_add(batch.discovered());
                    report.errors = report.errors.saturating_add(batch.errors.len());
                }
                Err(err) => {
                    warn!(server_id = %server_id, error = %err, "server discovery failed");
                    report.errors = report.errors.saturating_add(1);
                }
            }
        }

        let mut stats = self.stats.lock();
        stats.discovery_rounds = stats.discovery_rounds.saturating_add(1);
        stats.last_discovery_at = Some(self.clock.utc());
        info!(
            servers = report.servers_scanned,
            tools = report.tools_discovered,
            errors = report.errors,
            "discovery round completed"
        );
        report
    }

    /// Lists discovered node types, ordered by name.
    #[must_use]
    pub fn list_node_types(&self, query: &NodeTypeQuery) -> Vec<NodeTypeListing> {
        self.tools
            .registrations(query.server_id.as_ref())
            .into_iter()
            .map(|registration| NodeTypeListing {
                descriptor: registration.descriptor().clone(),
                metadata: query.include_metadata.then_some(registration),
            })
            .collect()
    }

    /// Looks up one registration by generated name.
    #[must_use]
    pub fn registration(&self, node_type_name: &str) -> Option<ToolRegistration> {
        self.tools.registration(node_type_name)
    }

    /// Returns aggregate metrics.
    #[must_use]
    pub fn metrics(&self) -> DiscoveryMetrics {
        let connections = self.servers.connections();
        let connected_servers = connections
            .iter()
            .filter(|connection| connection.state() == ConnectionState::Connected)
            .count();
        let stats = self.stats.lock();
        DiscoveryMetrics {
            servers: connections.len(),
            connected_servers,
            tools: self.tools.len(),
            conflicts: self.tools.conflicts().len(),
            executions: stats.executions,
            failed_executions: stats.failed_executions,
            average_response_ms: stats.average_response_ms,
            error_rate_permille: stats.error_rate_permille,
            discovery_rounds: stats.discovery_rounds,
            last_discovery_at: stats.last_discovery_at,
        }
    }

    /// Returns outstanding conflicts.
    #[must_use]
    pub fn conflicts(&self) -> Vec<ToolConflict> {
        self.tools.conflicts()
    }

    /// Returns up to `limit` recent changes, newest first.
    #[must_use]
    pub fn recent_changes(&self, limit: usize) -> Vec<ChangeEvent> {
        self.synchronizer.get_recent_changes(limit)
    }

    /// Returns a server's retained changes, oldest first.
    #[must_use]
    pub fn change_history(&self, server_id: &ServerId) -> Vec<ChangeEvent> {
        self.synchronizer.get_change_history(server_id)
    }

    /// Resyncs a server immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Synchronization`] when the round fails.
    pub async fn force_synchronization(
        &self,
        server_id: &ServerId,
    ) -> CoordinatorResult<BatchReport> {
        Ok(self.synchronizer.force_synchronization(server_id).await?)
    }

    /// Returns sync status for one server or all of them.
    #[must_use]
    pub fn synchronization_status(
        &self,
        server_id: Option<&ServerId>,
    ) -> Vec<SynchronizationStatus> {
        self.synchronizer.get_synchronization_status(server_id)
    }

    /// Subscribes to server lifecycle events.
    #[must_use]
    pub fn subscribe_server_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.servers.subscribe()
    }

    /// Subscribes to registry events.
    #[must_use]
    pub fn subscribe_registry_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tools.subscribe()
    }

    /// Subscribes to sync events.
    #[must_use]
    pub fn subscribe_sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.synchronizer.subscribe()
    }

    /// Tears the engine down.
    ///
    /// Background tasks and sync schedules stop before the registry is
    /// cleared and connections are closed. Safe to call more than once.
    pub async fn cleanup(&self) {
        let background = self.background.lock().take();
        if let Some(Background { token, tasks }) = background {
            token.cancel();
            for task in tasks {
                task.abort();
            }
        }
        self.synchronizer.shutdown();
        self.tools.clear();
        self.servers.close_all("coordinator shutdown").await;
        info!("discovery coordinator cleaned up");
    }
}

async fn status_pump<F, C>(
    tools: Arc<ToolRegistry<F, C>>,
    mut events: broadcast::Receiver<ServerEvent>,
    token: CancellationToken,
) where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    loop {
        let received = tokio::select! {
            () = token.cancelled() => break,
            received = events.recv() => received,
        };
        let event = match received {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "server events dropped by status pump");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let status = match &event {
            ServerEvent::ServerConnected { .. } => RegistrationStatus::Active,
            ServerEvent::ServerDisconnected { .. } | ServerEvent::ServerError { .. } => {
                RegistrationStatus::Inactive
            }
            ServerEvent::CapabilitiesUpdated { .. } => continue,
        };
        let changed = tools.set_server_status(event.server_id(), status);
        if changed > 0 {
            debug!(
                server_id = %event.server_id(),
                %status,
                changed,
                "registration status updated"
            );
        }
    }
}

async fn discovery_loop<F, C>(
    coordinator: Weak<DiscoveryCoordinator<F, C>>,
    period: Duration,
    token: CancellationToken,
) where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(active) = coordinator.upgrade() else {
            break;
        };
        let report = active.perform_discovery_round().await;
        debug!(errors = report.errors, "scheduled discovery round finished");
    }
}
