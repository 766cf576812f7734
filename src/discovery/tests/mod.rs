//! Unit tests for the discovery services.
//!
//! Tests run the services against the in-memory client adapter and are
//! organised by component.

mod config_tests;
mod mapper_tests;
mod server_registry_tests;
mod support;
