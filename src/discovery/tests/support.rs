//! Shared fixtures for discovery service tests.

use std::sync::{Arc, Once};

use crate::discovery::{
    adapters::InMemoryMcpClientFactory,
    config::DiscoveryConfig,
    domain::{ConflictPolicy, McpTransport, ServerDescriptor, ServerId, ToolCapability},
    services::{DiscoveryCoordinator, ServerRegistry, ToolRegistry},
};
use mockable::DefaultClock;
use serde_json::{Value, json};
use tokio::sync::broadcast;

pub(super) type TestServerRegistry = ServerRegistry<InMemoryMcpClientFactory, DefaultClock>;
pub(super) type TestToolRegistry = ToolRegistry<InMemoryMcpClientFactory, DefaultClock>;
pub(super) type TestCoordinator = DiscoveryCoordinator<InMemoryMcpClientFactory, DefaultClock>;

static TRACING: Once = Once::new();

/// Routes `tracing` output through the test harness, filtered by `RUST_LOG`.
pub(super) fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub(super) fn server_id(raw: &str) -> ServerId {
    ServerId::new(raw).expect("valid server id")
}

pub(super) fn stdio_server(raw: &str) -> ServerDescriptor {
    ServerDescriptor::new(
        server_id(raw),
        format!("{raw} server"),
        McpTransport::stdio("mcp-server").expect("valid transport"),
    )
}

pub(super) fn capability(name: &str, description: &str, schema: Value) -> ToolCapability {
    ToolCapability::new(name, description, schema).expect("valid capability")
}

/// The `fetch` tool: one required URL argument.
pub(super) fn fetch_tool() -> ToolCapability {
    capability(
        "fetch",
        "Fetch a URL",
        json!({
            "type": "object",
            "properties": { "url": { "type": "string", "format": "url" } },
            "required": ["url"]
        }),
    )
}

pub(super) fn simple_tool(name: &str) -> ToolCapability {
    capability(
        name,
        &format!("{name} tool"),
        json!({ "type": "object", "properties": { "input": { "type": "string" } } }),
    )
}

/// A server registry and tool registry sharing one scripted factory.
pub(super) struct Registries {
    pub factory: Arc<InMemoryMcpClientFactory>,
    pub servers: Arc<TestServerRegistry>,
    pub tools: TestToolRegistry,
}

pub(super) fn registries(policy: ConflictPolicy) -> Registries {
    init_tracing();
    let factory = Arc::new(InMemoryMcpClientFactory::new());
    let clock = Arc::new(DefaultClock);
    let config = DiscoveryConfig::manual();
    let servers = Arc::new(ServerRegistry::new(
        Arc::clone(&factory),
        Arc::clone(&clock),
        config.event_capacity,
    ));
    let tools = ToolRegistry::new(
        Arc::clone(&servers),
        clock,
        policy,
        config.version_strategy,
        config.event_capacity,
    );
    Registries {
        factory,
        servers,
        tools,
    }
}

impl Registries {
    /// Scripts `catalog` for `raw` and registers the server.
    pub async fn connect(&self, raw: &str, catalog: Vec<ToolCapability>) -> ServerId {
        let id = server_id(raw);
        self.factory
            .set_catalog(&id, catalog)
            .expect("catalog should be scripted");
        self.servers
            .register(stdio_server(raw))
            .await
            .expect("server should connect");
        id
    }
}

/// Builds a coordinator over a scripted factory.
pub(super) fn coordinator(
    config: DiscoveryConfig,
    factory: &Arc<InMemoryMcpClientFactory>,
) -> Arc<TestCoordinator> {
    init_tracing();
    Arc::new(DiscoveryCoordinator::new(
        config,
        Arc::clone(factory),
        Arc::new(DefaultClock),
    ))
}

/// Collects every event already buffered on a receiver.
pub(super) fn drain<E: Clone>(receiver: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
