//! Discovery engine configuration.

use crate::discovery::domain::{ConflictPolicy, VersionStrategy};
use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors returned while loading a [`DiscoveryConfig`].
#[derive(Debug, Error)]
pub enum DiscoveryConfigError {
    /// The document is not valid configuration JSON.
    #[error("invalid discovery configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the engine cannot run with.
    #[error("invalid discovery configuration: {field} {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Tunables for the discovery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Rule applied when two servers publish the same tool name.
    pub conflict_policy: ConflictPolicy,
    /// How registration versions move on update.
    pub version_strategy: VersionStrategy,
    /// Seconds between capability polls per server; `0` disables polling.
    pub poll_interval_secs: u64,
    /// Whether to resync on server push notifications.
    pub push_updates: bool,
    /// Seconds between coordinator discovery rounds; `0` disables the loop.
    pub discovery_interval_secs: u64,
    /// Change events retained per server.
    pub history_per_server: usize,
    /// Change events retained across all servers.
    pub history_total: usize,
    /// Buffered events per component channel.
    pub event_capacity: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Prefix,
            version_strategy: VersionStrategy::Semantic,
            poll_interval_secs: 300,
            push_updates: true,
            discovery_interval_secs: 0,
            history_per_server: 100,
            history_total: 500,
            event_capacity: 256,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a configuration with no scheduled work.
    ///
    /// Synchronization only happens on explicit request, which keeps hosts
    /// and tests deterministic.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            poll_interval_secs: 0,
            push_updates: false,
            discovery_interval_secs: 0,
            ..Default::default()
        }
    }

    /// Loads a configuration from JSON, filling omitted fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryConfigError`] when the document is not a JSON
    /// object of known fields or `event_capacity` is zero.
    pub fn from_json(raw: &str) -> Result<Self, DiscoveryConfigError> {
        let document: Value = serde_json::from_str(raw)?;
        if let Some(unexpected) = non_object(&document) {
            let expected = "a configuration object";
            return Err(serde_json::Error::invalid_type(unexpected, &expected).into());
        }
        let config: Self = serde_json::from_value(document)?;
        if config.event_capacity == 0 {
            return Err(DiscoveryConfigError::Invalid {
                field: "event_capacity",
                reason: "must be positive",
            });
        }
        Ok(config)
    }

    /// Sets the conflict policy.
    #[must_use]
    pub const fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the version strategy.
    #[must_use]
    pub const fn with_version_strategy(mut self, strategy: VersionStrategy) -> Self {
        self.version_strategy = strategy;
        self
    }

    /// Returns the poll period, or `None` when polling is disabled.
    #[must_use]
    pub const fn poll_interval(&self) -> Option<Duration> {
        non_zero_seconds(self.poll_interval_secs)
    }

    /// Returns the discovery loop period, or `None` when disabled.
    #[must_use]
    pub const fn discovery_interval(&self) -> Option<Duration> {
        non_zero_seconds(self.discovery_interval_secs)
    }
}

fn non_object(document: &Value) -> Option<Unexpected<'_>> {
    match document {
        Value::Object(_) => None,
        Value::Null => Some(Unexpected::Unit),
        Value::Bool(flag) => Some(Unexpected::Bool(*flag)),
        Value::Number(_) => Some(Unexpected::Other("number")),
        Value::String(text) => Some(Unexpected::Str(text)),
        Value::Array(_) => Some(Unexpected::Seq),
    }
}

const fn non_zero_seconds(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}
