//! Server descriptor and connection state machine.

use super::{
    DiscoveryDomainError, McpTransport, ParseConnectionStateError, ServerId, ToolCapability,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a registered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport handle is open.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The server acknowledged the connection.
    Connected,
    /// The connection failed; only re-registration recovers it.
    Error,
}

impl ConnectionState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Returns whether capabilities can be fetched and tools invoked.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Disconnected, Self::Connecting)
                | (
                    Self::Connecting,
                    Self::Connected | Self::Error | Self::Disconnected
                )
                | (Self::Connected | Self::Error, Self::Disconnected)
                | (Self::Connected, Self::Error)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionState {
    type Error = ParseConnectionStateError;

    fn try_from(value: &str) -> Result<Self, ParseConnectionStateError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            _ => Err(ParseConnectionStateError(value.to_owned())),
        }
    }
}

/// Immutable configuration of a capability-providing server.
///
/// Replaced wholesale on re-registration, never partially mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    id: ServerId,
    display_name: String,
    transport: McpTransport,
    enabled: bool,
}

impl ServerDescriptor {
    /// Creates an enabled server descriptor.
    ///
    /// A blank display name falls back to the server id.
    #[must_use]
    pub fn new(id: ServerId, display_name: impl Into<String>, transport: McpTransport) -> Self {
        let trimmed = display_name.into().trim().to_owned();
        let resolved_display_name = if trimmed.is_empty() {
            id.as_str().to_owned()
        } else {
            trimmed
        };

        Self {
            id,
            display_name: resolved_display_name,
            transport,
            enabled: true,
        }
    }

    /// Sets whether the server connects on registration.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &McpTransport {
        &self.transport
    }

    /// Returns whether the server connects on registration.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Runtime connection record for one registered server.
///
/// The transport handle itself is owned by the server registry; this record
/// carries the state machine and the last-known capability set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    state: ConnectionState,
    capabilities: Vec<ToolCapability>,
    last_error: Option<String>,
    registered_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    capabilities_fetched_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl ServerConnection {
    /// Creates a `disconnected` record for a newly registered descriptor.
    #[must_use]
    pub fn new(descriptor: ServerDescriptor, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            descriptor,
            state: ConnectionState::Disconnected,
            capabilities: Vec::new(),
            last_error: None,
            registered_at: timestamp,
            connected_at: None,
            capabilities_fetched_at: None,
            updated_at: timestamp,
        }
    }

    /// Returns the server descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerId {
        self.descriptor.id()
    }

    /// Returns the connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the last-known capability set.
    #[must_use]
    pub fn capabilities(&self) -> &[ToolCapability] {
        &self.capabilities
    }

    /// Returns the latest error reason, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns when the connection was last acknowledged.
    #[must_use]
    pub const fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Returns when capabilities were last fetched.
    #[must_use]
    pub const fn capabilities_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.capabilities_fetched_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the record to `connecting`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidConnectionTransition`] unless
    /// the record is `disconnected`.
    pub fn mark_connecting(&mut self, clock: &impl Clock) -> Result<(), DiscoveryDomainError> {
        self.transition_to(ConnectionState::Connecting)?;
        self.last_error = None;
        self.touch(clock);
        Ok(())
    }

    /// Moves the record to `connected`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidConnectionTransition`] unless
    /// the record is `connecting`.
    pub fn mark_connected(&mut self, clock: &impl Clock) -> Result<(), DiscoveryDomainError> {
        self.transition_to(ConnectionState::Connected)?;
        let timestamp = clock.utc();
        self.connected_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Moves the record to `error` with a reason.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidConnectionTransition`] unless
    /// the record is `connecting` or `connected`.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), DiscoveryDomainError> {
        self.transition_to(ConnectionState::Error)?;
        self.last_error = Some(reason.into());
        self.touch(clock);
        Ok(())
    }

    /// Moves the record to `disconnected`.
    ///
    /// Already-disconnected records are left untouched so repeated calls are
    /// no-ops.
    pub fn mark_disconnected(&mut self, clock: &impl Clock) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.touch(clock);
    }

    /// Replaces the cached capability set.
    pub fn replace_capabilities(&mut self, capabilities: Vec<ToolCapability>, clock: &impl Clock) {
        let timestamp = clock.utc();
        self.capabilities = capabilities;
        self.capabilities_fetched_at = Some(timestamp);
        self.updated_at = timestamp;
    }

    /// Validates that the server is `connected`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::ServerNotConnected`] otherwise.
    pub fn ensure_connected(&self) -> Result<(), DiscoveryDomainError> {
        if self.state.is_connected() {
            return Ok(());
        }

        Err(DiscoveryDomainError::ServerNotConnected {
            server_id: self.id().clone(),
            state: self.state.as_str().to_owned(),
        })
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }

    fn transition_to(&mut self, target_state: ConnectionState) -> Result<(), DiscoveryDomainError> {
        if !self.state.can_transition_to(target_state) {
            return Err(DiscoveryDomainError::InvalidConnectionTransition {
                from: self.state.as_str().to_owned(),
                to: target_state.as_str().to_owned(),
            });
        }

        self.state = target_state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use rstest::rstest;

    fn build_connection(clock: &DefaultClock) -> ServerConnection {
        let id = ServerId::new("workspace_tools").expect("valid server id");
        let transport = McpTransport::stdio("mcp-server").expect("valid transport");
        ServerConnection::new(ServerDescriptor::new(id, "Workspace", transport), clock)
    }

    #[test]
    fn connection_starts_disconnected() {
        let clock = DefaultClock;
        let connection = build_connection(&clock);

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.capabilities().is_empty());
        assert!(connection.last_error().is_none());
    }

    #[rstest]
    #[case(ConnectionState::Disconnected, ConnectionState::Connecting, true)]
    #[case(ConnectionState::Connecting, ConnectionState::Connected, true)]
    #[case(ConnectionState::Connecting, ConnectionState::Error, true)]
    #[case(ConnectionState::Connected, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Connected, ConnectionState::Error, true)]
    #[case(ConnectionState::Error, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Error, ConnectionState::Connecting, false)]
    #[case(ConnectionState::Error, ConnectionState::Connected, false)]
    #[case(ConnectionState::Disconnected, ConnectionState::Connected, false)]
    #[case(ConnectionState::Connected, ConnectionState::Connecting, false)]
    fn connection_transition_matrix(
        #[case] current: ConnectionState,
        #[case] target: ConnectionState,
        #[case] expected: bool,
    ) {
        assert_eq!(current.can_transition_to(target), expected);
    }

    #[test]
    fn connect_then_fail_records_reason() {
        let clock = DefaultClock;
        let mut connection = build_connection(&clock);
        connection
            .mark_connecting(&clock)
            .expect("connecting transition should succeed");
        connection
            .mark_connected(&clock)
            .expect("connected transition should succeed");
        connection
            .mark_failed("pipe closed", &clock)
            .expect("failure transition should succeed");

        assert_eq!(connection.state(), ConnectionState::Error);
        assert_eq!(connection.last_error(), Some("pipe closed"));
        assert!(connection.connected_at().is_some());
    }

    #[test]
    fn ensure_connected_rejects_disconnected() {
        let clock = DefaultClock;
        let connection = build_connection(&clock);

        assert!(matches!(
            connection.ensure_connected(),
            Err(DiscoveryDomainError::ServerNotConnected { .. })
        ));
    }

    #[test]
    fn blank_display_name_falls_back_to_id() {
        let id = ServerId::new("files").expect("valid server id");
        let transport = McpTransport::stdio("files-server").expect("valid transport");
        let descriptor = ServerDescriptor::new(id, "  ", transport);
        assert_eq!(descriptor.display_name(), "files");
    }

    #[rstest]
    #[case("connected", Some(ConnectionState::Connected))]
    #[case(" ERROR ", Some(ConnectionState::Error))]
    #[case("gone", None)]
    fn parse_connection_state(#[case] raw: &str, #[case] expected: Option<ConnectionState>) {
        assert_eq!(ConnectionState::try_from(raw).ok(), expected);
    }
}
