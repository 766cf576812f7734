//! Connection lifecycle tests for the server registry.

use std::sync::Arc;

use super::support::{
    TestServerRegistry, drain, fetch_tool, init_tracing, server_id, simple_tool, stdio_server,
};
use crate::discovery::{
    adapters::InMemoryMcpClientFactory,
    domain::{ConnectionState, ServerDescriptor, ServerEvent},
    ports::{
        McpClientError, McpClientFactory, McpClientResult, McpServerClient, ToolCallOutput,
        ToolListChanged,
    },
    services::{ServerRegistry, ServerRegistryError},
};
use async_trait::async_trait;
use mockable::DefaultClock;
use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tokio::sync::broadcast;

struct Context {
    factory: Arc<InMemoryMcpClientFactory>,
    registry: TestServerRegistry,
}

#[fixture]
fn context() -> Context {
    init_tracing();
    let factory = Arc::new(InMemoryMcpClientFactory::new());
    let registry = ServerRegistry::new(Arc::clone(&factory), Arc::new(DefaultClock), 64);
    Context { factory, registry }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn register_connects_and_caches_capabilities(context: Context) {
    let id = server_id("weather");
    context
        .factory
        .set_catalog(&id, vec![fetch_tool(), simple_tool("forecast")])
        .expect("catalog");
    let mut events = context.registry.subscribe();

    let connection = context
        .registry
        .register(stdio_server("weather"))
        .await
        .expect("registration should succeed");

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.capabilities().len(), 2);
    assert!(connection.capabilities_fetched_at().is_some());
    assert_eq!(context.factory.connect_count(&id).expect("count"), 1);
    let observed = drain(&mut events);
    assert!(observed.contains(&ServerEvent::CapabilitiesUpdated {
        server_id: id.clone(),
        tool_count: 2,
    }));
    assert!(observed.contains(&ServerEvent::ServerConnected {
        server_id: id,
        capabilities: vec!["fetch".to_owned(), "forecast".to_owned()],
    }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_registration_is_rejected_without_overwriting(context: Context) {
    context
        .registry
        .register(stdio_server("dup"))
        .await
        .expect("first registration");
    let replacement = stdio_server("dup").with_enabled(false);

    let result = context.registry.register(replacement).await;

    assert!(matches!(
        result,
        Err(ServerRegistryError::DuplicateServer(ref id)) if id.as_str() == "dup"
    ));
    assert!(context.registry.is_connected(&server_id("dup")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_connection_requires_reregistration(context: Context) {
    let id = server_id("flaky");
    context
        .factory
        .fail_connect(&id, "connection refused")
        .expect("script failure");
    let mut events = context.registry.subscribe();

    let result = context.registry.register(stdio_server("flaky")).await;

    assert!(matches!(result, Err(ServerRegistryError::Connection { .. })));
    let connection = context.registry.connection(&id).expect("server kept");
    assert_eq!(connection.state(), ConnectionState::Error);
    assert!(
        connection
            .last_error()
            .is_some_and(|reason| reason.contains("connection refused"))
    );
    assert!(drain(&mut events).iter().any(|event| matches!(
        event,
        ServerEvent::ServerError { server_id, .. } if server_id == &id
    )));
    assert!(matches!(
        context.registry.connect(&id).await,
        Err(ServerRegistryError::Domain(_))
    ));

    context.factory.clear_failures(&id).expect("clear failure");
    assert!(context.registry.unregister(&id, "retry").await.is_some());
    let recovered = context
        .registry
        .register(stdio_server("flaky"))
        .await
        .expect("re-registration should connect");
    assert_eq!(recovered.state(), ConnectionState::Connected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabled_server_connects_on_request(context: Context) {
    let id = server_id("later");
    context
        .factory
        .set_catalog(&id, vec![fetch_tool()])
        .expect("catalog");

    let stored = context
        .registry
        .register(stdio_server("later").with_enabled(false))
        .await
        .expect("registration should succeed");
    assert_eq!(stored.state(), ConnectionState::Disconnected);
    assert_eq!(context.factory.connect_count(&id).expect("count"), 0);

    let connected = context.registry.connect(&id).await.expect("connect");
    assert_eq!(connected.state(), ConnectionState::Connected);
    assert_eq!(connected.capabilities().len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregister_closes_once_and_is_idempotent(context: Context) {
    let id = server_id("gone");
    context
        .registry
        .register(stdio_server("gone"))
        .await
        .expect("registration");
    let mut events = context.registry.subscribe();

    let removed = context.registry.unregister(&id, "operator request").await;
    let again = context.registry.unregister(&id, "operator request").await;

    assert_eq!(
        removed.map(|connection| connection.state()),
        Some(ConnectionState::Disconnected)
    );
    assert!(again.is_none());
    assert_eq!(context.factory.disconnect_count(&id).expect("count"), 1);
    assert_eq!(
        drain(&mut events),
        vec![ServerEvent::ServerDisconnected {
            server_id: id,
            reason: "operator request".to_owned(),
        }]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnect_twice_is_a_no_op(context: Context) {
    let id = server_id("pause");
    context
        .registry
        .register(stdio_server("pause"))
        .await
        .expect("registration");

    context.registry.disconnect(&id, "pause").await.expect("first");
    context.registry.disconnect(&id, "pause").await.expect("second");

    assert_eq!(context.factory.disconnect_count(&id).expect("count"), 1);
    assert_eq!(
        context.registry.connection(&id).map(|connection| connection.state()),
        Some(ConnectionState::Disconnected)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fetch_requires_a_connected_server(context: Context) {
    let id = server_id("idle");
    context
        .registry
        .register(stdio_server("idle").with_enabled(false))
        .await
        .expect("registration");

    let result = context.registry.fetch_capabilities(&id).await;

    assert!(matches!(
        result,
        Err(ServerRegistryError::Unavailable {
            state: ConnectionState::Disconnected,
            ..
        })
    ));
    assert!(matches!(
        context.registry.fetch_capabilities(&server_id("unknown")).await,
        Err(ServerRegistryError::NotFound(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_moves_server_to_error(context: Context) {
    let id = server_id("broken");
    context
        .registry
        .register(stdio_server("broken"))
        .await
        .expect("registration");
    context
        .factory
        .fail_transport(&id, "pipe closed")
        .expect("script failure");

    let result = context.registry.fetch_capabilities(&id).await;

    assert!(matches!(result, Err(ServerRegistryError::Client { .. })));
    assert_eq!(
        context.registry.connection(&id).map(|connection| connection.state()),
        Some(ConnectionState::Error)
    );
    assert_eq!(context.factory.disconnect_count(&id).expect("count"), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remote_listing_error_keeps_connection(context: Context) {
    let id = server_id("moody");
    context
        .factory
        .fail_listing(&id, "tools/list not supported")
        .expect("script failure");

    let connection = context
        .registry
        .register(stdio_server("moody"))
        .await
        .expect("registration should succeed");

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.capabilities().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_and_duplicate_payloads_are_skipped(context: Context) {
    let id = server_id("messy");
    context
        .factory
        .set_raw_catalog(
            &id,
            vec![
                json!({ "name": "fetch", "inputSchema": { "type": "object" } }),
                json!("not an object"),
                json!({ "description": "nameless" }),
                json!({ "name": "fetch", "description": "shadow" }),
                json!({ "name": "lookup", "inputSchema": [] }),
            ],
        )
        .expect("catalog");

    let connection = context
        .registry
        .register(stdio_server("messy"))
        .await
        .expect("registration");

    let names: Vec<_> = connection
        .capabilities()
        .iter()
        .map(|capability| capability.name().to_owned())
        .collect();
    assert_eq!(names, ["fetch", "lookup"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connected_ids_are_sorted(context: Context) {
    for raw in ["zeta", "alpha"] {
        context
            .registry
            .register(stdio_server(raw))
            .await
            .expect("registration");
    }
    context
        .registry
        .register(stdio_server("off").with_enabled(false))
        .await
        .expect("registration");

    let ids: Vec<_> = context
        .registry
        .connected_server_ids()
        .iter()
        .map(|id| id.as_str().to_owned())
        .collect();
    assert_eq!(ids, ["alpha", "zeta"]);
    assert_eq!(context.registry.connections().len(), 3);
}

mock! {
    FlakyClient {}

    #[async_trait]
    impl McpServerClient for FlakyClient {
        async fn connect(&self) -> McpClientResult<()>;
        async fn disconnect(&self) -> McpClientResult<()>;
        async fn list_capabilities(&self) -> McpClientResult<Vec<Value>>;
        async fn call_tool(&self, name: &str, arguments: Value) -> McpClientResult<ToolCallOutput>;
        fn capability_changes(&self) -> Option<broadcast::Receiver<ToolListChanged>>;
    }
}

struct FixedClientFactory {
    client: Arc<dyn McpServerClient>,
}

impl McpClientFactory for FixedClientFactory {
    fn create(&self, _descriptor: &ServerDescriptor) -> McpClientResult<Arc<dyn McpServerClient>> {
        Ok(Arc::clone(&self.client))
    }
}

fn connected_mock() -> MockFlakyClient {
    let mut client = MockFlakyClient::new();
    client.expect_connect().returning(|| Ok(()));
    client
        .expect_list_capabilities()
        .returning(|| Ok(vec![json!({ "name": "echo" })]));
    client
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_close_still_unregisters() {
    init_tracing();
    let mut client = connected_mock();
    client
        .expect_disconnect()
        .times(1)
        .returning(|| Err(McpClientError::Transport("broken pipe".to_owned())));
    let factory = Arc::new(FixedClientFactory {
        client: Arc::new(client),
    });
    let registry = ServerRegistry::new(factory, Arc::new(DefaultClock), 8);
    let id = server_id("mocked");
    registry
        .register(stdio_server("mocked"))
        .await
        .expect("registration");

    let removed = registry.unregister(&id, "shutdown").await;

    assert!(removed.is_some());
    assert!(registry.connection(&id).is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remote_call_error_keeps_server_connected() {
    init_tracing();
    let mut client = connected_mock();
    client
        .expect_call_tool()
        .returning(|_, _| Err(McpClientError::Remote("quota exceeded".to_owned())));
    let factory = Arc::new(FixedClientFactory {
        client: Arc::new(client),
    });
    let registry = ServerRegistry::new(factory, Arc::new(DefaultClock), 8);
    let id = server_id("mocked");
    registry
        .register(stdio_server("mocked"))
        .await
        .expect("registration");

    let result = registry.call_tool(&id, "echo", json!({})).await;

    let Err(ServerRegistryError::Client { source, .. }) = result else {
        panic!("expected a client error");
    };
    assert_eq!(source.message(), "quota exceeded");
    assert!(registry.is_connected(&id));
}
