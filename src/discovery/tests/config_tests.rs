//! Loading tests for the discovery configuration.

use std::time::Duration;

use crate::discovery::{
    config::{DiscoveryConfig, DiscoveryConfigError},
    domain::{ConflictPolicy, VersionStrategy},
};
use rstest::rstest;

#[rstest]
fn defaults_poll_and_listen_for_pushes() {
    let config = DiscoveryConfig::default();

    assert_eq!(config.conflict_policy, ConflictPolicy::Prefix);
    assert_eq!(config.version_strategy, VersionStrategy::Semantic);
    assert_eq!(config.poll_interval(), Some(Duration::from_secs(300)));
    assert!(config.push_updates);
    assert_eq!(config.discovery_interval(), None);
    assert_eq!(config.history_per_server, 100);
    assert_eq!(config.history_total, 500);
}

#[rstest]
fn manual_configuration_schedules_nothing() {
    let config = DiscoveryConfig::manual();

    assert_eq!(config.poll_interval(), None);
    assert_eq!(config.discovery_interval(), None);
    assert!(!config.push_updates);
}

#[rstest]
fn omitted_fields_take_defaults() {
    let config = DiscoveryConfig::from_json(
        r#"{
            "conflict_policy": "version",
            "version_strategy": "increment",
            "poll_interval_secs": 0
        }"#,
    )
    .expect("configuration should parse");

    assert_eq!(config.conflict_policy, ConflictPolicy::Version);
    assert_eq!(config.version_strategy, VersionStrategy::Increment);
    assert_eq!(config.poll_interval(), None);
    assert_eq!(config.event_capacity, 256);
}

#[rstest]
#[case(r#"{ "conflict_policy": "random" }"#)]
#[case(r#"{ "poll_interval_secs": -1 }"#)]
#[case("[]")]
#[case("[0, 300, true]")]
#[case("null")]
#[case(r#"{ "poll_interval": 30 }"#)]
fn malformed_documents_fail_to_parse(#[case] raw: &str) {
    assert!(matches!(
        DiscoveryConfig::from_json(raw),
        Err(DiscoveryConfigError::Parse(_))
    ));
}

#[rstest]
fn zero_event_capacity_is_rejected() {
    let result = DiscoveryConfig::from_json(r#"{ "event_capacity": 0 }"#);

    assert!(matches!(
        result,
        Err(DiscoveryConfigError::Invalid {
            field: "event_capacity",
            ..
        })
    ));
}

#[rstest]
fn builders_override_policies() {
    let config = DiscoveryConfig::manual()
        .with_conflict_policy(ConflictPolicy::Error)
        .with_version_strategy(VersionStrategy::Timestamp);

    assert_eq!(config.conflict_policy, ConflictPolicy::Error);
    assert_eq!(config.version_strategy, VersionStrategy::Timestamp);
}
