//! Shared fixtures for in-memory discovery integration tests.

use std::sync::Arc;

use capstan::discovery::{
    adapters::InMemoryMcpClientFactory,
    config::DiscoveryConfig,
    domain::{McpTransport, ServerDescriptor, ServerId, ToolCapability},
    services::DiscoveryCoordinator,
};
use mockable::DefaultClock;
use rstest::fixture;
use serde_json::{Value, json};

/// Coordinator over the scripted in-memory client.
pub type Coordinator = DiscoveryCoordinator<InMemoryMcpClientFactory, DefaultClock>;

/// A coordinator and the factory scripting its servers.
pub struct Engine {
    /// Scripted client factory shared with the coordinator.
    pub factory: Arc<InMemoryMcpClientFactory>,
    /// Engine under test.
    pub coordinator: Arc<Coordinator>,
}

impl Engine {
    /// Builds an engine from a configuration and factory.
    #[must_use]
    pub fn new(config: DiscoveryConfig, factory: InMemoryMcpClientFactory) -> Self {
        let shared = Arc::new(factory);
        let coordinator = Arc::new(DiscoveryCoordinator::new(
            config,
            Arc::clone(&shared),
            Arc::new(DefaultClock),
        ));
        Self {
            factory: shared,
            coordinator,
        }
    }

    /// Scripts `catalog` for `raw` and registers it as a stdio server.
    ///
    /// # Panics
    ///
    /// Panics when scripting or registration fails.
    pub async fn register(&self, raw: &str, catalog: Vec<ToolCapability>) -> ServerId {
        let id = server_id(raw);
        self.factory
            .set_catalog(&id, catalog)
            .expect("catalog should be scripted");
        self.coordinator
            .register_server(stdio_server(raw))
            .await
            .expect("server should register");
        id
    }

    /// Returns every generated node type name, sorted.
    #[must_use]
    pub fn node_type_names(&self) -> Vec<String> {
        self.coordinator
            .tools()
            .all_tool_metadata()
            .iter()
            .map(|registration| registration.node_type_name().as_str().to_owned())
            .collect()
    }
}

/// Provides an engine with no scheduled work.
#[fixture]
pub fn engine() -> Engine {
    Engine::new(DiscoveryConfig::manual(), InMemoryMcpClientFactory::new())
}

/// Parses a server id.
///
/// # Panics
///
/// Panics when `raw` is not a valid id.
#[must_use]
pub fn server_id(raw: &str) -> ServerId {
    ServerId::new(raw).expect("valid server id")
}

/// Builds a stdio server descriptor named after its id.
///
/// # Panics
///
/// Panics when `raw` is not a valid id.
#[must_use]
pub fn stdio_server(raw: &str) -> ServerDescriptor {
    ServerDescriptor::new(
        server_id(raw),
        raw,
        McpTransport::stdio("mcp-server").expect("valid transport"),
    )
}

/// Builds a capability with the given input schema.
///
/// # Panics
///
/// Panics when `name` is blank.
#[must_use]
pub fn tool(name: &str, schema: Value) -> ToolCapability {
    ToolCapability::new(name, format!("{name} tool"), schema).expect("valid capability")
}

/// Builds a capability taking one optional string argument.
#[must_use]
pub fn text_tool(name: &str) -> ToolCapability {
    tool(
        name,
        json!({ "type": "object", "properties": { "text": { "type": "string" } } }),
    )
}

/// Builds the `fetch` tool taking one required URL.
#[must_use]
pub fn fetch_tool() -> ToolCapability {
    tool(
        "fetch",
        json!({
            "type": "object",
            "properties": { "url": { "type": "string", "format": "url" } },
            "required": ["url"]
        }),
    )
}
