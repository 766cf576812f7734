//! In-memory integration tests for conflict policies.

use super::helpers::{Engine, engine, text_tool};
use capstan::discovery::{
    adapters::InMemoryMcpClientFactory,
    config::DiscoveryConfig,
    domain::{ChangeKind, ConflictPolicy},
};
use rstest::rstest;
use serde_json::json;

fn engine_with(policy: ConflictPolicy) -> Engine {
    Engine::new(
        DiscoveryConfig::manual().with_conflict_policy(policy),
        InMemoryMcpClientFactory::new(),
    )
}

#[rstest]
#[case(ConflictPolicy::Prefix, &["alpha_send", "beta_send"], 2)]
#[case(ConflictPolicy::Version, &["alpha_send", "beta_send_v2"], 2)]
#[case(ConflictPolicy::Manual, &["alpha_send", "beta_send"], 0)]
#[case(ConflictPolicy::Error, &["alpha_send"], 0)]
#[tokio::test(flavor = "multi_thread")]
async fn policies_shape_generated_names(
    #[case] policy: ConflictPolicy,
    #[case] expected: &[&str],
    #[case] resolved: usize,
) {
    let engine = engine_with(policy);
    engine.register("alpha", vec![text_tool("send")]).await;
    engine.register("beta", vec![text_tool("send")]).await;

    assert_eq!(engine.node_type_names(), expected);
    let conflicts = engine.coordinator.conflicts();
    assert_eq!(
        conflicts
            .first()
            .map_or(0, |conflict| conflict.resolved_names().len()),
        resolved
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn version_suffix_follows_server_order_not_arrival() {
    let engine = engine_with(ConflictPolicy::Version);
    engine.register("beta", vec![text_tool("send")]).await;
    engine.register("alpha", vec![text_tool("send")]).await;

    assert_eq!(engine.node_type_names(), ["alpha_send_v1", "beta_send"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn both_prefixed_tools_execute_on_their_own_server(engine: Engine) {
    let alpha = engine.register("alpha", vec![text_tool("send")]).await;
    let beta = engine.register("beta", vec![text_tool("send")]).await;

    for (name, owner) in [("alpha_send", &alpha), ("beta_send", &beta)] {
        let result = engine
            .coordinator
            .execute_tool(name, json!({ "text": "hello" }))
            .await
            .expect("execution should succeed");
        assert_eq!(&result.context.server_id, owner);
    }
    for owner in [&alpha, &beta] {
        assert_eq!(engine.factory.calls(owner).expect("calls").len(), 1);
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn last_remaining_owner_settles_the_conflict(engine: Engine) {
    let alpha = engine.register("alpha", vec![text_tool("send")]).await;
    engine.register("beta", vec![text_tool("send")]).await;
    engine.register("gamma", vec![text_tool("send")]).await;
    assert_eq!(
        engine
            .coordinator
            .conflicts()
            .first()
            .map(|conflict| conflict.owners().len()),
        Some(3)
    );

    assert!(engine.coordinator.unregister_server(&alpha).await);
    assert_eq!(engine.coordinator.conflicts().len(), 1);
    assert!(
        engine
            .coordinator
            .unregister_server(&super::helpers::server_id("beta"))
            .await
    );

    assert!(engine.coordinator.conflicts().is_empty());
    assert_eq!(engine.node_type_names(), ["gamma_send"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_conflicts_leave_sibling_tools_registered() {
    let engine = engine_with(ConflictPolicy::Error);
    engine.register("alpha", vec![text_tool("send")]).await;

    let registered = engine
        .coordinator
        .register_server(super::helpers::stdio_server("beta"))
        .await;

    assert!(registered.is_ok());
    engine
        .factory
        .set_catalog(
            &super::helpers::server_id("beta"),
            vec![text_tool("send"), text_tool("archive")],
        )
        .expect("catalog");
    let report = engine
        .coordinator
        .force_synchronization(&super::helpers::server_id("beta"))
        .await
        .expect("sync should succeed");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(engine.node_type_names(), ["alpha_send", "beta_archive"]);
    let conflicts = engine
        .coordinator
        .change_history(&super::helpers::server_id("beta"))
        .iter()
        .filter(|change| change.kind == ChangeKind::Conflict && change.tool_name == "send")
        .count();
    assert_eq!(conflicts, 1);
}
