//! Adapter implementations for the discovery client port.

mod memory;

pub use memory::{InMemoryMcpClient, InMemoryMcpClientFactory, RecordedCall};
