//! Discovery, conversion and synchronization of remote tool capabilities.
//!
//! Remote capability-providing servers are connected through the
//! [`ports::McpServerClient`] port, their tools are converted into
//! [`domain::NodeTypeDescriptor`] values and kept in a hot-reloadable
//! registry that follows the servers' changing capability sets. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]
//! - Engine tunables in [`config`]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
