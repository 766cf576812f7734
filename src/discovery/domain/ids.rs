//! Identifier and generated-name types for discovery.

use super::DiscoveryDomainError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Maximum length for a server identifier.
const MAX_SERVER_ID_LENGTH: usize = 100;

/// Fallback segment used when a name sanitizes to nothing.
const EMPTY_SEGMENT_FALLBACK: &str = "tool";

/// Caller-chosen unique key of a capability-providing server.
///
/// Case is preserved; generated node names are lowercased separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// Creates a validated server identifier.
    ///
    /// The input is trimmed. Only ASCII alphanumerics, `_`, `-` and `.` are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, DiscoveryDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(DiscoveryDomainError::EmptyServerId);
        }

        let is_valid = normalized
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || "_-.".contains(character));
        if !is_valid {
            return Err(DiscoveryDomainError::InvalidServerId(normalized));
        }

        if normalized.len() > MAX_SERVER_ID_LENGTH {
            return Err(DiscoveryDomainError::ServerIdTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the server identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerId {
    type Error = DiscoveryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerId> for String {
    fn from(value: ServerId) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Process-wide unique name of a generated node type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTypeName(String);

impl NodeTypeName {
    /// Generates `{prefix}_{tool}` with both segments sanitized.
    ///
    /// Sanitizing lowercases the input and collapses every run of
    /// non-alphanumeric characters into a single `_`.
    #[must_use]
    pub fn generate(prefix: &str, tool_name: &str) -> Self {
        let prefix_segment = sanitize_segment(prefix);
        let tool_segment = sanitize_segment(tool_name);
        let tool_part = if tool_segment.is_empty() {
            EMPTY_SEGMENT_FALLBACK.to_owned()
        } else {
            tool_segment
        };

        if prefix_segment.is_empty() {
            return Self(tool_part);
        }
        Self(format!("{prefix_segment}_{tool_part}"))
    }

    /// Returns a copy of this name with a sanitized suffix appended.
    #[must_use]
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let suffix_segment = sanitize_segment(suffix);
        if suffix_segment.is_empty() {
            return self.clone();
        }
        Self(format!("{}_{suffix_segment}", self.0))
    }

    /// Returns the node type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeTypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeTypeName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for NodeTypeName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Lowercases and collapses non-alphanumeric runs to `_`, trimming the ends.
#[must_use]
pub fn sanitize_segment(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    let mut pending_separator = false;

    for character in value.chars() {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !sanitized.is_empty() {
                sanitized.push('_');
            }
            pending_separator = false;
            sanitized.push(character.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    sanitized
}

/// Unique identifier of a recorded change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeEventId(Uuid);

impl ChangeEventId {
    /// Creates a new random change event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ChangeEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeEventId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
