//! Per-tool registration metadata and versioning.

use super::{
    NodeTypeDescriptor, NodeTypeName, ParseRegistrationStatusError, ParseVersionStrategyError,
    ServerId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a registration: one per server and tool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolKey {
    /// Owning server.
    pub server_id: ServerId,
    /// Remote tool name.
    pub tool_name: String,
}

impl ToolKey {
    /// Creates a registration key.
    #[must_use]
    pub fn new(server_id: ServerId, tool_name: impl Into<String>) -> Self {
        Self {
            server_id,
            tool_name: tool_name.into(),
        }
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.server_id, self.tool_name)
    }
}

/// How a registration's version moves when its capability changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStrategy {
    /// `major.minor.patch`, bumping the patch component.
    #[default]
    Semantic,
    /// Clock timestamp of the update.
    Timestamp,
    /// Monotonic counter.
    Increment,
}

impl VersionStrategy {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Timestamp => "timestamp",
            Self::Increment => "increment",
        }
    }

    /// Returns the first version under this strategy.
    #[must_use]
    pub fn initial(self, clock: &impl Clock) -> ToolVersion {
        match self {
            Self::Semantic => ToolVersion::Semantic {
                major: 1,
                minor: 0,
                patch: 0,
            },
            Self::Timestamp => ToolVersion::Timestamp(clock.utc()),
            Self::Increment => ToolVersion::Increment(1),
        }
    }
}

impl fmt::Display for VersionStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for VersionStrategy {
    type Error = ParseVersionStrategyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "semantic" => Ok(Self::Semantic),
            "timestamp" => Ok(Self::Timestamp),
            "increment" => Ok(Self::Increment),
            _ => Err(ParseVersionStrategyError(value.to_owned())),
        }
    }
}

/// Version tag of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ToolVersion {
    /// Semantic version.
    Semantic {
        /// Major component.
        major: u32,
        /// Minor component.
        minor: u32,
        /// Patch component.
        patch: u32,
    },
    /// Update timestamp.
    Timestamp(DateTime<Utc>),
    /// Update counter.
    Increment(u64),
}

impl ToolVersion {
    /// Returns the version following `self` under `strategy`.
    ///
    /// Switching strategy between updates restarts at the strategy's
    /// successor of its initial version.
    #[must_use]
    pub fn next(self, strategy: VersionStrategy, clock: &impl Clock) -> Self {
        match (strategy, self) {
            (
                VersionStrategy::Semantic,
                Self::Semantic {
                    major,
                    minor,
                    patch,
                },
            ) => Self::Semantic {
                major,
                minor,
                patch: patch.saturating_add(1),
            },
            (VersionStrategy::Increment, Self::Increment(counter)) => {
                Self::Increment(counter.saturating_add(1))
            }
            (VersionStrategy::Timestamp, _) => Self::Timestamp(clock.utc()),
            (VersionStrategy::Semantic | VersionStrategy::Increment, _) => {
                strategy.initial(clock).next(strategy, clock)
            }
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic {
                major,
                minor,
                patch,
            } => write!(formatter, "{major}.{minor}.{patch}"),
            Self::Timestamp(timestamp) => write!(formatter, "{}", timestamp.to_rfc3339()),
            Self::Increment(counter) => write!(formatter, "{counter}"),
        }
    }
}

/// Lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Usable.
    Active,
    /// Owning server is not reachable.
    Inactive,
    /// The latest execution failed.
    Error,
    /// Marked for retirement by an operator.
    Deprecated,
}

impl RegistrationStatus {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RegistrationStatus {
    type Error = ParseRegistrationStatusError;

    fn try_from(value: &str) -> Result<Self, ParseRegistrationStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(ParseRegistrationStatusError(value.to_owned())),
        }
    }
}

/// Registration metadata for one remote tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRegistration {
    key: ToolKey,
    descriptor: NodeTypeDescriptor,
    fingerprint: String,
    version: ToolVersion,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    call_count: u64,
    last_called_at: Option<DateTime<Utc>>,
    average_latency_ms: u64,
    #[serde(default)]
    success_count: u64,
    error_count: u64,
    last_error: Option<String>,
    status: RegistrationStatus,
}

impl ToolRegistration {
    /// Creates an `active` registration at the strategy's initial version.
    #[must_use]
    pub fn new(
        key: ToolKey,
        descriptor: NodeTypeDescriptor,
        fingerprint: String,
        strategy: VersionStrategy,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            key,
            descriptor,
            fingerprint,
            version: strategy.initial(clock),
            registered_at: timestamp,
            updated_at: timestamp,
            call_count: 0,
            last_called_at: None,
            average_latency_ms: 0,
            success_count: 0,
            error_count: 0,
            last_error: None,
            status: RegistrationStatus::Active,
        }
    }

    /// Returns the registration key.
    #[must_use]
    pub const fn key(&self) -> &ToolKey {
        &self.key
    }

    /// Returns the current descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &NodeTypeDescriptor {
        &self.descriptor
    }

    /// Returns the generated node type name.
    #[must_use]
    pub const fn node_type_name(&self) -> &NodeTypeName {
        &self.descriptor.name
    }

    /// Returns the capability fingerprint the descriptor was built from.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the version tag.
    #[must_use]
    pub const fn version(&self) -> ToolVersion {
        self.version
    }

    /// Returns the first registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the cumulative call count.
    #[must_use]
    pub const fn call_count(&self) -> u64 {
        self.call_count
    }

    /// Returns when the tool was last called.
    #[must_use]
    pub const fn last_called_at(&self) -> Option<DateTime<Utc>> {
        self.last_called_at
    }

    /// Returns the rolling average latency of successful calls.
    #[must_use]
    pub const fn average_latency_ms(&self) -> u64 {
        self.average_latency_ms
    }

    /// Returns the number of calls that completed successfully.
    #[must_use]
    pub const fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Returns the cumulative error count.
    #[must_use]
    pub const fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Returns the latest error message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> RegistrationStatus {
        self.status
    }

    /// Returns whether `fingerprint` differs from the registered one.
    #[must_use]
    pub fn is_stale(&self, fingerprint: &str) -> bool {
        self.fingerprint != fingerprint
    }

    /// Supersedes the descriptor, bumping the version.
    ///
    /// Call and error counters survive the update.
    pub fn supersede(
        &mut self,
        descriptor: NodeTypeDescriptor,
        fingerprint: String,
        strategy: VersionStrategy,
        clock: &impl Clock,
    ) {
        self.descriptor = descriptor;
        self.fingerprint = fingerprint;
        self.version = self.version.next(strategy, clock);
        self.updated_at = clock.utc();
    }

    /// Counts a call before it is dispatched.
    pub fn record_call_started(&mut self, clock: &impl Clock) {
        self.call_count = self.call_count.saturating_add(1);
        self.last_called_at = Some(clock.utc());
    }

    /// Folds a successful call's latency into the rolling average.
    ///
    /// Only completed successes count toward the divisor, so calls still in
    /// flight do not skew the average.
    pub fn record_success(&mut self, latency_ms: u64) {
        let previous_total = self.average_latency_ms.saturating_mul(self.success_count);
        self.success_count = self.success_count.saturating_add(1);
        self.average_latency_ms = previous_total
            .saturating_add(latency_ms)
            .checked_div(self.success_count)
            .unwrap_or(latency_ms);
        if self.status == RegistrationStatus::Error || self.status == RegistrationStatus::Inactive
        {
            self.status = RegistrationStatus::Active;
        }
    }

    /// Records a failed call.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(message.into());
        self.status = RegistrationStatus::Error;
    }

    /// Sets the lifecycle status.
    pub const fn set_status(&mut self, status: RegistrationStatus) {
        self.status = status;
    }
}
