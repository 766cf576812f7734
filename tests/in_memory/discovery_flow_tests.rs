//! In-memory integration tests for discovery, hot reload and execution.

use std::time::Duration;

use super::helpers::{Engine, engine, fetch_tool, server_id, stdio_server, text_tool};
use capstan::discovery::{
    adapters::InMemoryMcpClientFactory,
    config::DiscoveryConfig,
    domain::{
        ChangeKind, ConnectionState, McpTransport, OPERATION_PROPERTY, PropertyType,
        RegistrationStatus, ServerDescriptor, SyncEvent, SyncTrigger,
    },
    services::{CoordinatorError, ExecutionError, NodeTypeQuery},
};
use rstest::rstest;
use serde_json::json;
use tokio::sync::broadcast;

async fn next_push_round(events: &mut broadcast::Receiver<SyncEvent>) -> usize {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SyncEvent::SyncCompleted {
                trigger: SyncTrigger::Push,
                changes,
                ..
            } = events.recv().await.expect("sync channel open")
            {
                return changes;
            }
        }
    })
    .await
    .expect("push round should complete")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fetch_tool_is_discovered_as_a_url_node(engine: Engine) {
    engine.register("A", vec![fetch_tool()]).await;

    let listings = engine.coordinator.list_node_types(&NodeTypeQuery::default());

    let listing = listings.first().expect("one node type");
    assert_eq!(listings.len(), 1);
    let descriptor = &listing.descriptor;
    assert_eq!(descriptor.name.as_str(), "a_fetch");
    let visible: Vec<_> = descriptor.visible_properties().collect();
    assert_eq!(visible.len(), 1);
    let url = visible.first().expect("url property");
    assert_eq!(url.name, "url");
    assert_eq!(url.property_type, PropertyType::String);
    assert!(url.required);
    assert!(url.placeholder.is_some());
    let operation = descriptor
        .property(OPERATION_PROPERTY)
        .expect("operation property");
    assert!(operation.is_hidden());
    assert_eq!(operation.default, Some(json!("fetch")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn push_notifications_hot_reload_the_registry() {
    let config = DiscoveryConfig {
        push_updates: true,
        ..DiscoveryConfig::manual()
    };
    let engine = Engine::new(config, InMemoryMcpClientFactory::new().with_push_notifications());
    engine.coordinator.start();
    let id = engine
        .register("docs", vec![text_tool("search"), text_tool("summarize")])
        .await;
    let mut events = engine.coordinator.subscribe_sync_events();

    engine
        .factory
        .set_catalog(&id, vec![text_tool("search"), text_tool("translate")])
        .expect("catalog");
    engine
        .factory
        .notify_capabilities_changed(&id)
        .expect("notify");
    let changes = next_push_round(&mut events).await;

    assert_eq!(changes, 2);
    assert_eq!(engine.node_type_names(), ["docs_search", "docs_translate"]);
    let kinds: Vec<_> = engine
        .coordinator
        .recent_changes(2)
        .iter()
        .map(|change| change.kind)
        .collect();
    assert_eq!(kinds, [ChangeKind::Registered, ChangeKind::Unregistered]);
    engine.coordinator.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_server_recovers_through_reregistration(engine: Engine) {
    let id = server_id("api");
    engine
        .factory
        .fail_connect(&id, "connection refused")
        .expect("script failure");
    let first = engine.coordinator.register_server(stdio_server("api")).await;
    assert!(matches!(first, Err(CoordinatorError::Server(_))));

    engine.factory.clear_failures(&id).expect("clear");
    engine
        .factory
        .set_catalog(&id, vec![fetch_tool()])
        .expect("catalog");
    assert!(engine.coordinator.unregister_server(&id).await);
    let replacement = ServerDescriptor::new(
        id.clone(),
        "API over HTTP",
        McpTransport::streamable_http("https://api.example.com/mcp").expect("valid endpoint"),
    );
    let registered = engine
        .coordinator
        .register_server(replacement)
        .await
        .expect("re-registration should succeed");

    assert_eq!(registered.connection.state(), ConnectionState::Connected);
    assert_eq!(registered.connection.descriptor().display_name(), "API over HTTP");
    let descriptor = engine
        .coordinator
        .registration("api_fetch")
        .map(|registration| registration.descriptor().clone())
        .expect("tool registered");
    assert_eq!(descriptor.routing.transport, "streamable_http");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_during_execution_deactivates_tools(engine: Engine) {
    engine.coordinator.start();
    let id = engine
        .register("flaky", vec![text_tool("echo"), text_tool("ping")])
        .await;
    engine
        .factory
        .fail_transport(&id, "socket reset")
        .expect("script failure");

    let result = engine
        .coordinator
        .execute_tool("flaky_echo", json!({ "text": "hi" }))
        .await;

    assert!(matches!(
        result,
        Err(CoordinatorError::Execution(ExecutionError::Remote { ref message, .. }))
            if message == "socket reset"
    ));
    let deactivated = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let inactive = engine
                .coordinator
                .registration("flaky_ping")
                .is_some_and(|registration| registration.status() == RegistrationStatus::Inactive);
            if inactive {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(deactivated.is_ok());
    assert_eq!(
        engine
            .coordinator
            .servers()
            .connection(&id)
            .map(|connection| connection.state()),
        Some(ConnectionState::Error)
    );
    engine.coordinator.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn discovery_round_picks_up_changes_on_every_server(engine: Engine) {
    let first = engine.register("one", vec![text_tool("a")]).await;
    let second = engine.register("two", vec![text_tool("b")]).await;
    engine
        .factory
        .set_catalog(&first, vec![text_tool("a"), text_tool("c")])
        .expect("catalog");
    engine
        .factory
        .set_catalog(&second, Vec::new())
        .expect("catalog");

    let report = engine.coordinator.perform_discovery_round().await;

    assert_eq!(report.servers_scanned, 2);
    assert_eq!(report.tools_discovered, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(engine.node_type_names(), ["one_a", "one_c"]);
}
