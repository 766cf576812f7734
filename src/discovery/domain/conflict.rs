//! Tool-name conflicts between servers.

use super::{NodeTypeName, ParseConflictPolicyError, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Rule applied when two servers publish the same tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Disambiguate with the server id prefix.
    #[default]
    Prefix,
    /// Disambiguate with a `_v{n}` suffix ordered by server id.
    Version,
    /// Register, record the conflict, and leave resolution to an operator.
    Manual,
    /// Reject the later registration.
    Error,
}

impl ConflictPolicy {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Version => "version",
            Self::Manual => "manual",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConflictPolicy {
    type Error = ParseConflictPolicyError;

    fn try_from(value: &str) -> Result<Self, ParseConflictPolicyError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "prefix" => Ok(Self::Prefix),
            "version" => Ok(Self::Version),
            "manual" => Ok(Self::Manual),
            "error" => Ok(Self::Error),
            _ => Err(ParseConflictPolicyError(value.to_owned())),
        }
    }
}

/// A tool name currently published by two or more servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConflict {
    tool_name: String,
    owners: BTreeSet<ServerId>,
    strategy: ConflictPolicy,
    resolved_names: BTreeMap<ServerId, NodeTypeName>,
    detected_at: DateTime<Utc>,
}

impl ToolConflict {
    /// Opens a conflict record for `tool_name`.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        strategy: ConflictPolicy,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            owners: BTreeSet::new(),
            strategy,
            resolved_names: BTreeMap::new(),
            detected_at,
        }
    }

    /// Adds an owner and, when the policy produced one, its resolved name.
    ///
    /// Returns `true` when the owner was not already listed.
    pub fn add_owner(&mut self, server_id: ServerId, resolved_name: Option<NodeTypeName>) -> bool {
        if let Some(name) = resolved_name {
            self.resolved_names.insert(server_id.clone(), name);
        }
        self.owners.insert(server_id)
    }

    /// Removes an owner and its resolved name.
    pub fn remove_owner(&mut self, server_id: &ServerId) {
        self.owners.remove(server_id);
        self.resolved_names.remove(server_id);
    }

    /// Returns whether at least two owners remain.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.owners.len() >= 2
    }

    /// Returns the contested tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the publishing servers in id order.
    #[must_use]
    pub const fn owners(&self) -> &BTreeSet<ServerId> {
        &self.owners
    }

    /// Returns the policy applied.
    #[must_use]
    pub const fn strategy(&self) -> ConflictPolicy {
        self.strategy
    }

    /// Returns the disambiguated node name chosen for `server_id`.
    #[must_use]
    pub fn resolved_name(&self, server_id: &ServerId) -> Option<&NodeTypeName> {
        self.resolved_names.get(server_id)
    }

    /// Returns all disambiguated names.
    #[must_use]
    pub const fn resolved_names(&self) -> &BTreeMap<ServerId, NodeTypeName> {
        &self.resolved_names
    }

    /// Returns when the conflict was first detected.
    #[must_use]
    pub const fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
}
