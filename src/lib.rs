//! Capstan: live discovery of remote tool capabilities as workflow nodes.
//!
//! This crate connects to capability-providing servers, converts each
//! declared tool into a typed node-type descriptor, and keeps a registry of
//! those descriptors in sync with the servers without restarting the host.
//!
//! # Architecture
//!
//! Capstan follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports
//! - **Services**: Registries, synchronization and orchestration
//!
//! # Modules
//!
//! - [`discovery`]: Server registry, schema mapping, tool registry,
//!   capability synchronization and the discovery coordinator

pub mod discovery;
