//! Conversion tests for the tool schema mapper.

use super::support::{capability, fetch_tool, server_id, stdio_server};
use crate::discovery::{
    domain::{
        McpTransport, NodeGroup, NodeTypeName, OPERATION_PROPERTY, PropertyType,
        ServerDescriptor, StreamableHttpTransportConfig, ToolAnnotations,
    },
    services::{ConversionContext, ToolSchemaMapper},
};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

#[fixture]
fn mapper() -> ToolSchemaMapper {
    ToolSchemaMapper::default()
}

fn context(raw: &str) -> ConversionContext {
    ConversionContext::for_server(&stdio_server(raw))
}

fn single_property_type(mapper: &ToolSchemaMapper, schema: Value) -> PropertyType {
    let tool = capability(
        "inspect",
        "",
        json!({ "type": "object", "properties": { "field": schema } }),
    );
    let descriptor = mapper.convert(&tool, &context("srv"));
    descriptor
        .property("field")
        .map(|property| property.property_type)
        .expect("field property should exist")
}

#[rstest]
fn fetch_tool_becomes_url_node(mapper: ToolSchemaMapper) {
    let descriptor = mapper.convert(&fetch_tool(), &context("A"));

    assert_eq!(descriptor.name.as_str(), "a_fetch");
    let visible: Vec<_> = descriptor.visible_properties().collect();
    assert_eq!(visible.len(), 1);
    let url = visible.first().expect("url property");
    assert_eq!(url.name, "url");
    assert_eq!(url.property_type, PropertyType::String);
    assert!(url.required);
    assert_eq!(url.placeholder.as_deref(), Some("https://example.com"));

    let operation = descriptor
        .property(OPERATION_PROPERTY)
        .expect("operation property");
    assert!(operation.is_hidden());
    assert_eq!(operation.default, Some(json!("fetch")));
    assert_eq!(descriptor.operation(), Some("fetch"));
    assert_eq!(descriptor.routing.server_id, server_id("A"));
    assert_eq!(descriptor.routing.transport, "stdio");
}

#[rstest]
#[case(json!({ "type": "string" }), PropertyType::String)]
#[case(json!({ "type": "integer" }), PropertyType::Number)]
#[case(json!({ "type": "number", "minimum": 0 }), PropertyType::Number)]
#[case(json!({ "type": "boolean" }), PropertyType::Boolean)]
#[case(json!({ "enum": ["low", "high"] }), PropertyType::Options)]
#[case(json!({ "type": "array", "items": { "enum": ["a", "b"] } }), PropertyType::MultiOptions)]
#[case(json!({ "type": "array", "items": { "type": "string" } }), PropertyType::Json)]
#[case(
    json!({ "type": "object", "properties": { "k": { "type": "string" } } }),
    PropertyType::Collection
)]
#[case(json!({ "type": "object" }), PropertyType::Json)]
#[case(json!({ "type": "mystery" }), PropertyType::Json)]
#[case(json!("not a schema"), PropertyType::Json)]
fn schema_types_map_to_property_types(
    mapper: ToolSchemaMapper,
    #[case] schema: Value,
    #[case] expected: PropertyType,
) {
    assert_eq!(single_property_type(&mapper, schema), expected);
}

#[rstest]
#[case(json!({ "type": "array" }))]
#[case(json!(null))]
#[case(json!({ "type": "string" }))]
fn non_object_schemas_keep_only_the_operation_property(
    mapper: ToolSchemaMapper,
    #[case] schema: Value,
) {
    let descriptor = mapper.convert(&capability("odd", "", schema), &context("srv"));

    assert_eq!(descriptor.properties.len(), 1);
    let operations = descriptor
        .properties
        .iter()
        .filter(|property| property.name == OPERATION_PROPERTY)
        .count();
    assert_eq!(operations, 1);
}

#[rstest]
fn properties_keep_declared_order(mapper: ToolSchemaMapper) {
    let tool = capability(
        "sort",
        "",
        json!({
            "type": "object",
            "properties": {
                "zeta": { "type": "string" },
                "alpha": { "type": "string" },
                "middle": { "type": "number" }
            }
        }),
    );

    let descriptor = mapper.convert(&tool, &context("srv"));

    let names: Vec<_> = descriptor
        .properties
        .iter()
        .map(|property| property.name.as_str())
        .collect();
    assert_eq!(names, ["zeta", "alpha", "middle", OPERATION_PROPERTY]);
}

#[rstest]
fn declared_operation_argument_keeps_its_name(mapper: ToolSchemaMapper) {
    let tool = capability(
        "dispatch",
        "",
        json!({
            "type": "object",
            "properties": {
                "operation": { "type": "string" },
                "_operation": { "type": "boolean" }
            }
        }),
    );

    let descriptor = mapper.convert(&tool, &context("srv"));

    let declared = descriptor
        .property(OPERATION_PROPERTY)
        .expect("declared argument");
    assert_eq!(declared.property_type, PropertyType::String);
    let hidden = descriptor.operation_property().expect("hidden property");
    assert_eq!(hidden.name, "__operation");
    assert_eq!(descriptor.operation(), Some("dispatch"));
    let mut names: Vec<_> = descriptor
        .properties
        .iter()
        .map(|property| property.name.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), descriptor.properties.len());
}

#[rstest]
fn property_hints_are_carried(mapper: ToolSchemaMapper) {
    let tool = capability(
        "tune",
        "",
        json!({
            "type": "object",
            "properties": {
                "count": { "type": "integer", "minimum": 1, "maximum": 5 },
                "verbose": { "type": "boolean" },
                "level": { "enum": ["debug", "info", 3] },
                "secret": { "type": "string", "format": "password", "title": "API secret" }
            }
        }),
    );
    let descriptor = mapper.convert(&tool, &context("srv"));

    let count = descriptor.property("count").expect("count");
    assert_eq!(count.type_options.number_precision, Some(0));
    assert_eq!(count.type_options.min_value, Some(1.0));
    assert_eq!(count.type_options.max_value, Some(5.0));

    let verbose = descriptor.property("verbose").expect("verbose");
    assert_eq!(verbose.default, Some(json!(false)));

    let level = descriptor.property("level").expect("level");
    let labels: Vec<_> = level.options.iter().map(|option| option.name.as_str()).collect();
    assert_eq!(labels, ["debug", "info", "3"]);

    let secret = descriptor.property("secret").expect("secret");
    assert!(secret.type_options.password);
    assert_eq!(secret.display_name, "API secret");
}

#[rstest]
#[case("send_email", ToolAnnotations::default(), NodeGroup::Output)]
#[case("get_weather", ToolAnnotations::default(), NodeGroup::Input)]
#[case("translate", ToolAnnotations::default(), NodeGroup::Transform)]
#[case(
    "translate",
    ToolAnnotations { read_only_hint: Some(true), ..ToolAnnotations::default() },
    NodeGroup::Input
)]
#[case(
    "get_and_purge",
    ToolAnnotations { destructive_hint: Some(true), ..ToolAnnotations::default() },
    NodeGroup::Output
)]
fn groups_follow_hints_then_verbs(
    mapper: ToolSchemaMapper,
    #[case] name: &str,
    #[case] annotations: ToolAnnotations,
    #[case] expected: NodeGroup,
) {
    let tool = capability(name, "", json!({ "type": "object" })).with_annotations(annotations);

    assert_eq!(mapper.convert(&tool, &context("srv")).group, expected);
}

#[rstest]
fn display_metadata_falls_back_to_tool_name(mapper: ToolSchemaMapper) {
    let descriptor = mapper.convert(
        &capability("listOpenIssues", "", json!({ "type": "object" })),
        &context("tracker"),
    );

    assert_eq!(descriptor.display_name, "List Open Issues");
    assert_eq!(descriptor.description, "List Open Issues from tracker");
    assert!(descriptor.credentials.is_none());
}

#[rstest]
fn credentialed_transport_gets_a_credential_hint() {
    let transport = McpTransport::StreamableHttp(
        StreamableHttpTransportConfig::new("https://tools.example.com/mcp")
            .expect("valid endpoint")
            .header("Authorization", "Bearer x"),
    );
    let server = ServerDescriptor::new(server_id("remote"), "Remote", transport);
    let mapper = ToolSchemaMapper::new("remoteToolsApi");

    let descriptor = mapper.convert(&fetch_tool(), &ConversionContext::for_server(&server));

    let credentials = descriptor.credentials.expect("credential hint");
    assert_eq!(credentials.name, "remoteToolsApi");
    assert!(credentials.required);
    assert_eq!(descriptor.routing.transport, "streamable_http");
}

#[rstest]
fn context_name_overrides_generated_name(mapper: ToolSchemaMapper) {
    let resolved = NodeTypeName::generate("srv", "fetch").with_suffix("v2");
    let descriptor = mapper.convert(
        &fetch_tool(),
        &context("srv").with_node_type_name(resolved.clone()),
    );

    assert_eq!(descriptor.name, resolved);
    assert_eq!(descriptor.operation(), Some("fetch"));
}
