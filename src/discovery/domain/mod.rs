//! Domain model for capability discovery and node-type registration.
//!
//! The discovery domain models server identity, transport configuration,
//! the connection state machine, declared tool capabilities and their input
//! schemas, generated node-type descriptors, registrations, conflicts and
//! change events. Infrastructure concerns remain outside this boundary.

mod capability;
mod conflict;
mod error;
mod events;
mod ids;
mod node;
mod registration;
mod schema;
mod server;
mod transport;

pub use capability::{ToolAnnotations, ToolCapability};
pub(crate) use capability::json_kind;
pub use conflict::{ConflictPolicy, ToolConflict};
pub use error::{
    DiscoveryDomainError, ParseConflictPolicyError, ParseConnectionStateError,
    ParseRegistrationStatusError, ParseVersionStrategyError,
};
pub use events::{
    ChangeEvent, ChangeKind, ChangeLog, RegistryEvent, ServerEvent, SyncEvent, SyncTrigger,
};
pub use ids::{ChangeEventId, NodeTypeName, ServerId, sanitize_segment};
pub use node::{
    CredentialHint, NodeGroup, NodeProperty, NodeTypeDescriptor, OPERATION_PROPERTY,
    PropertyOption, PropertyType, RequestRouting, TypeOptions, humanize,
};
pub use registration::{
    RegistrationStatus, ToolKey, ToolRegistration, ToolVersion, VersionStrategy,
};
pub use schema::{SchemaKind, SchemaMeta, SchemaNode, StringFormat};
pub use server::{ConnectionState, ServerConnection, ServerDescriptor};
pub use transport::{McpTransport, StdioTransportConfig, StreamableHttpTransportConfig};
