//! Discovery services: schema mapping, registries, sync and coordination.

mod coordinator;
mod events;
mod mapper;
mod operations;
mod server_registry;
mod synchronizer;
mod tool_registry;

pub use coordinator::{
    CoordinatorError, CoordinatorResult, DiscoveryCoordinator, DiscoveryMetrics,
    DiscoveryRoundReport, ExecutionContext, ExecutionResult, NodeTypeListing, NodeTypeQuery,
    RegisteredServer,
};
pub use events::EventChannel;
pub use mapper::{ConversionContext, ToolSchemaMapper};
pub use operations::{
    DiscoveryOperations, OperationDescriptor, OperationError, OperationRequest, operation_catalog,
};
pub use server_registry::{ServerRegistry, ServerRegistryError, ServerRegistryResult};
pub use synchronizer::{
    CapabilitySynchronizer, SynchronizationError, SynchronizationResult, SynchronizationStatus,
};
pub use tool_registry::{
    BatchReport, ExecutionError, RegistrationChange, RegistrationOutcome, ToolExecution,
    ToolRegistry, ToolRegistryError, ToolRegistryResult,
};
