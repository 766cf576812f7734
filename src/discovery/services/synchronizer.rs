//! Poll- and push-driven capability synchronization.

use super::{
    BatchReport, EventChannel, ServerRegistry, ServerRegistryError, ToolRegistry,
    ToolRegistryError,
};
use crate::discovery::{
    config::DiscoveryConfig,
    domain::{ChangeEvent, ChangeLog, ServerId, SyncEvent, SyncTrigger},
    ports::{McpClientFactory, ToolListChanged},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors returned by a sync round.
#[derive(Debug, Error)]
pub enum SynchronizationError {
    /// Capabilities could not be fetched.
    #[error(transparent)]
    Server(#[from] ServerRegistryError),

    /// The registry could not reconcile the server.
    #[error(transparent)]
    Registry(#[from] ToolRegistryError),
}

/// Result type for synchronization operations.
pub type SynchronizationResult<T> = Result<T, SynchronizationError>;

/// Per-server synchronization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationStatus {
    /// Server identifier.
    pub server_id: ServerId,
    /// Whether the poll trigger is running.
    pub polling_enabled: bool,
    /// Whether the push trigger is running.
    pub push_enabled: bool,
    /// Last successful round.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Last round, successful or not.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Failed rounds since the last success.
    pub consecutive_failures: u32,
    /// Failed rounds overall.
    pub total_failures: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl SynchronizationStatus {
    const fn new(server_id: ServerId) -> Self {
        Self {
            server_id,
            polling_enabled: false,
            push_enabled: false,
            last_sync_at: None,
            last_attempt_at: None,
            consecutive_failures: 0,
            total_failures: 0,
            last_error: None,
        }
    }
}

struct SyncSchedule {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncSchedule {
    fn cancel(self) {
        self.token.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

struct SyncState {
    schedules: HashMap<ServerId, SyncSchedule>,
    statuses: HashMap<ServerId, SynchronizationStatus>,
    history: HashMap<ServerId, ChangeLog>,
    recent: ChangeLog,
}

impl SyncState {
    fn status_mut(&mut self, server_id: &ServerId) -> &mut SynchronizationStatus {
        self.statuses
            .entry(server_id.clone())
            .or_insert_with(|| SynchronizationStatus::new(server_id.clone()))
    }
}

/// Decides when a server's registrations are reconciled.
///
/// Poll and push triggers converge on the same idempotent registration
/// path. Rounds for one server are serialized; rounds for different
/// servers run independently. A failing round is counted and reported as
/// a `sync-error` event but never stops the schedule.
pub struct CapabilitySynchronizer<F, C>
where
    F: McpClientFactory,
    C: Clock + Send + Sync,
{
    servers: Arc<ServerRegistry<F, C>>,
    tools: Arc<ToolRegistry<F, C>>,
    clock: Arc<C>,
    poll_interval: Option<Duration>,
    push_updates: bool,
    history_per_server: usize,
    state: Mutex<SyncState>,
    round_gates: Mutex<HashMap<ServerId, Arc<tokio::sync::Mutex<()>>>>,
    events: EventChannel<SyncEvent>,
}

impl<F, C> CapabilitySynchronizer<F, C>
where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a synchronizer with no scheduled servers.
    #[must_use]
    pub fn new(
        servers: Arc<ServerRegistry<F, C>>,
        tools: Arc<ToolRegistry<F, C>>,
        clock: Arc<C>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            servers,
            tools,
            clock,
            poll_interval: config.poll_interval(),
            push_updates: config.push_updates,
            history_per_server: config.history_per_server,
            state: Mutex::new(SyncState {
                schedules: HashMap::new(),
                statuses: HashMap::new(),
                history: HashMap::new(),
                recent: ChangeLog::with_capacity(config.history_total),
            }),
            round_gates: Mutex::new(HashMap::new()),
            events: EventChannel::new(config.event_capacity),
        }
    }

    /// Subscribes to sync events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Starts the poll and push triggers for a server.
    ///
    /// An existing schedule for the server is replaced. Push is only armed
    /// when enabled and the server's client offers change notifications.
    /// Must be called from within a Tokio runtime.
    pub fn start_synchronization(self: &Arc<Self>, server_id: &ServerId) {
        let token = CancellationToken::new();
        let mut tasks = Vec::new();

        if let Some(period) = self.poll_interval {
            tasks.push(tokio::spawn(poll_loop(
                Arc::downgrade(self),
                server_id.clone(),
                period,
                token.child_token(),
            )));
        }
        let changes = self
            .push_updates
            .then(|| self.servers.capability_changes(server_id))
            .flatten();
        let push_enabled = changes.is_some();
        if let Some(receiver) = changes {
            tasks.push(tokio::spawn(push_loop(
                Arc::downgrade(self),
                server_id.clone(),
                receiver,
                token.child_token(),
            )));
        }

        let polling_enabled = self.poll_interval.is_some();
        let replaced = {
            let mut state = self.state.lock();
            let status = state.status_mut(server_id);
            status.polling_enabled = polling_enabled;
            status.push_enabled = push_enabled;
            state
                .schedules
                .insert(server_id.clone(), SyncSchedule { token, tasks })
        };
        if let Some(previous) = replaced {
            previous.cancel();
        }
        info!(server_id = %server_id, polling_enabled, push_enabled, "synchronization started");
    }

    /// Stops both triggers for a server, keeping its status and history.
    ///
    /// Returns `true` when a schedule was running.
    pub fn stop_synchronization(&self, server_id: &ServerId) -> bool {
        let removed = {
            let mut state = self.state.lock();
            if let Some(status) = state.statuses.get_mut(server_id) {
                status.polling_enabled = false;
                status.push_enabled = false;
            }
            state.schedules.remove(server_id)
        };
        self.prune_round_gate(server_id);
        let Some(schedule) = removed else {
            return false;
        };
        schedule.cancel();
        info!(server_id = %server_id, "synchronization stopped");
        true
    }

    /// Stops a server's triggers, then runs `removal` once no round for the
    /// server is in flight.
    ///
    /// Rounds queued behind the removal find the server gone and fail.
    pub async fn retire_server<T>(
        &self,
        server_id: &ServerId,
        removal: impl Future<Output = T>,
    ) -> T {
        self.stop_synchronization(server_id);
        let gate = self.round_gate(server_id);
        let outcome = {
            let _round = gate.lock().await;
            removal.await
        };
        drop(gate);
        self.prune_round_gate(server_id);
        outcome
    }

    /// Stops every schedule.
    pub fn shutdown(&self) {
        let schedules: Vec<_> = {
            let mut state = self.state.lock();
            for status in state.statuses.values_mut() {
                status.polling_enabled = false;
                status.push_enabled = false;
            }
            state.schedules.drain().map(|(_, schedule)| schedule).collect()
        };
        let stopped = schedules.len();
        for schedule in schedules {
            schedule.cancel();
        }
        debug!(stopped, "synchronizer shut down");
    }

    /// Returns whether triggers are running for a server.
    #[must_use]
    pub fn is_scheduled(&self, server_id: &ServerId) -> bool {
        self.state.lock().schedules.contains_key(server_id)
    }

    /// Fetches a server's capabilities and reconciles its registrations
    /// immediately, regardless of the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`SynchronizationError`] when fetching or reconciling fails.
    /// The failure is also counted and emitted as a `sync-error` event.
    pub async fn force_synchronization(
        &self,
        server_id: &ServerId,
    ) -> SynchronizationResult<BatchReport> {
        self.run_round(server_id, SyncTrigger::Manual).await
    }

    /// Runs one fetch-and-reconcile round.
    ///
    /// # Errors
    ///
    /// Returns [`SynchronizationError`] when fetching or reconciling fails.
    pub async fn run_round(
        &self,
        server_id: &ServerId,
        trigger: SyncTrigger,
    ) -> SynchronizationResult<BatchReport> {
        let gate = self.round_gate(server_id);
        let _round = gate.lock().await;
        let outcome = match self.servers.fetch_capabilities(server_id).await {
            Ok(_) => self
                .tools
                .register_server_tools(server_id)
                .map_err(SynchronizationError::from),
            Err(err) => Err(err.into()),
        };
        self.finish_round(server_id, trigger, outcome)
    }

    /// Reconciles registrations with the capabilities already cached.
    ///
    /// # Errors
    ///
    /// Returns [`SynchronizationError`] when the server is unknown.
    pub async fn reconcile(
        &self,
        server_id: &ServerId,
        trigger: SyncTrigger,
    ) -> SynchronizationResult<BatchReport> {
        let gate = self.round_gate(server_id);
        let _round = gate.lock().await;
        let outcome = self
            .tools
            .register_server_tools(server_id)
            .map_err(SynchronizationError::from);
        self.finish_round(server_id, trigger, outcome)
    }

    /// Returns the status of one server, or of all servers ordered by id.
    #[must_use]
    pub fn get_synchronization_status(
        &self,
        server_id: Option<&ServerId>,
    ) -> Vec<SynchronizationStatus> {
        let state = self.state.lock();
        let mut statuses: Vec<_> = state
            .statuses
            .values()
            .filter(|status| server_id.is_none_or(|wanted| &status.server_id == wanted))
            .cloned()
            .collect();
        statuses.sort_by(|left, right| left.server_id.cmp(&right.server_id));
        statuses
    }

    /// Returns up to `limit` changes across all servers, newest first.
    #[must_use]
    pub fn get_recent_changes(&self, limit: usize) -> Vec<ChangeEvent> {
        self.state.lock().recent.recent(limit)
    }

    /// Returns the retained changes of one server, oldest first.
    #[must_use]
    pub fn get_change_history(&self, server_id: &ServerId) -> Vec<ChangeEvent> {
        self.state
            .lock()
            .history
            .get(server_id)
            .map(ChangeLog::entries)
            .unwrap_or_default()
    }

    /// Appends changes to the per-server and aggregate rings.
    pub fn record_changes(&self, changes: &[ChangeEvent]) {
        if changes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for change in changes {
            state
                .history
                .entry(change.server_id.clone())
                .or_insert_with(|| ChangeLog::with_capacity(self.history_per_server))
                .push(change.clone());
            state.recent.push(change.clone());
        }
    }

    fn round_gate(&self, server_id: &ServerId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.round_gates
                .lock()
                .entry(server_id.clone())
                .or_default(),
        )
    }

    fn prune_round_gate(&self, server_id: &ServerId) {
        let mut gates = self.round_gates.lock();
        if gates
            .get(server_id)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(server_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn round_gate_count(&self) -> usize {
        self.round_gates.lock().len()
    }

    fn finish_round(
        &self,
        server_id: &ServerId,
        trigger: SyncTrigger,
        outcome: SynchronizationResult<BatchReport>,
    ) -> SynchronizationResult<BatchReport> {
        let now = self.clock.utc();
        match outcome {
            Ok(report) => {
                self.record_changes(&report.changes);
                {
                    let mut state = self.state.lock();
                    let status = state.status_mut(server_id);
                    status.last_attempt_at = Some(now);
                    status.last_sync_at = Some(now);
                    status.consecutive_failures = 0;
                    status.last_error = None;
                }
                debug!(
                    server_id = %server_id,
                    ?trigger,
                    changes = report.changes.len(),
                    "sync round completed"
                );
                self.events.emit(SyncEvent::SyncCompleted {
                    server_id: server_id.clone(),
                    trigger,
                    changes: report.changes.len(),
                });
                Ok(report)
            }
            Err(err) => {
                let consecutive_failures = {
                    let mut state = self.state.lock();
                    let status = state.status_mut(server_id);
                    status.last_attempt_at = Some(now);
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    status.total_failures = status.total_failures.saturating_add(1);
                    status.last_error = Some(err.to_string());
                    status.consecutive_failures
                };
                warn!(
                    server_id = %server_id,
                    ?trigger,
                    consecutive_failures,
                    error = %err,
                    "sync round failed"
                );
                self.events.emit(SyncEvent::SyncError {
                    server_id: server_id.clone(),
                    trigger,
                    error: err.to_string(),
                    consecutive_failures,
                });
                Err(err)
            }
        }
    }

    fn disarm_push(&self, server_id: &ServerId) {
        if let Some(status) = self.state.lock().statuses.get_mut(server_id) {
            status.push_enabled = false;
        }
    }
}

async fn poll_loop<F, C>(
    synchronizer: Weak<CapabilitySynchronizer<F, C>>,
    server_id: ServerId,
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
        let Some(active) = synchronizer.upgrade() else {
            break;
        };
        if active.run_round(&server_id, SyncTrigger::Poll).await.is_err() {
            debug!(server_id = %server_id, "poll round failed; retrying next period");
        }
    }
}

async fn push_loop<F, C>(
    synchronizer: Weak<CapabilitySynchronizer<F, C>>,
    server_id: ServerId,
    mut changes: broadcast::Receiver<ToolListChanged>,
    token: CancellationToken,
) where
    F: McpClientFactory + 'static,
    C: Clock + Send + Sync + 'static,
{
    loop {
        let received = tokio::select! {
            () = token.cancelled() => break,
            received = changes.recv() => received,
        };
        let Some(active) = synchronizer.upgrade() else {
            break;
        };
        match received {
            Ok(ToolListChanged) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(server_id = %server_id, skipped, "coalescing missed change notifications");
            }
            Err(RecvError::Closed) => {
                debug!(server_id = %server_id, "change notifications closed");
                active.disarm_push(&server_id);
                break;
            }
        }
        if active.run_round(&server_id, SyncTrigger::Push).await.is_err() {
            debug!(server_id = %server_id, "push round failed");
        }
    }
}
