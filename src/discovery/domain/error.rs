//! Error types for discovery domain validation and parsing.

use super::ServerId;
use thiserror::Error;

/// Errors returned while constructing discovery domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryDomainError {
    /// The server identifier is empty after trimming.
    #[error("server id must not be empty")]
    EmptyServerId,

    /// The server identifier contains characters outside `[A-Za-z0-9_.-]`.
    #[error(
        "server id '{0}' contains invalid characters (only alphanumerics, '_', '-' and '.' allowed)"
    )]
    InvalidServerId(String),

    /// The server identifier exceeds the 100-character limit.
    #[error("server id exceeds 100 character limit: {0}")]
    ServerIdTooLong(String),

    /// The STDIO command is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// The STDIO working directory is empty after trimming.
    #[error("STDIO working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The streaming HTTP endpoint is empty.
    #[error("streaming HTTP endpoint must not be empty")]
    EmptyHttpEndpoint,

    /// The streaming HTTP endpoint does not have an `http://` or `https://` prefix.
    #[error("streaming HTTP endpoint '{0}' must start with 'http://' or 'https://'")]
    InvalidHttpEndpoint(String),

    /// A tool capability name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// A capability payload from a remote server could not be decoded.
    #[error("malformed tool capability: {0}")]
    MalformedCapability(String),

    /// Transitioning between two connection states is invalid.
    #[error("invalid connection state transition: {from} -> {to}")]
    InvalidConnectionTransition {
        /// Current connection state.
        from: String,
        /// Requested target connection state.
        to: String,
    },

    /// The operation needs a `connected` server.
    #[error("server {server_id} is not connected (current state: {state})")]
    ServerNotConnected {
        /// Server identifier.
        server_id: ServerId,
        /// Connection state in canonical string form.
        state: String,
    },
}

/// Error returned while parsing a connection state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connection state: {0}")]
pub struct ParseConnectionStateError(pub String);

/// Error returned while parsing a conflict policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown conflict resolution policy: {0}")]
pub struct ParseConflictPolicyError(pub String);

/// Error returned while parsing a version strategy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown version strategy: {0}")]
pub struct ParseVersionStrategyError(pub String);

/// Error returned while parsing a registration status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown registration status: {0}")]
pub struct ParseRegistrationStatusError(pub String);
