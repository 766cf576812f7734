//! Conversion of tool capabilities into node-type descriptors.

use crate::discovery::domain::{
    CredentialHint, NodeGroup, NodeProperty, NodeTypeDescriptor, NodeTypeName,
    OPERATION_PROPERTY, PropertyOption, PropertyType, RequestRouting, SchemaKind, SchemaNode,
    ServerDescriptor, ServerId, StringFormat, ToolCapability, humanize, json_kind,
};
use serde_json::Value;
use tracing::warn;

const DEFAULT_CREDENTIAL_NAME: &str = "mcpServerApi";
const DEFAULT_ICON: &str = "fa:plug";

const ICON_RULES: &[(&str, &str)] = &[
    ("mail", "fa:envelope"),
    ("message", "fa:comment"),
    ("chat", "fa:comment"),
    ("file", "fa:file"),
    ("dir", "fa:folder"),
    ("search", "fa:search"),
    ("sql", "fa:database"),
    ("db", "fa:database"),
    ("query", "fa:database"),
    ("fetch", "fa:globe"),
    ("http", "fa:globe"),
    ("url", "fa:globe"),
    ("git", "fa:code-branch"),
    ("calendar", "fa:calendar"),
    ("image", "fa:image"),
];

const INPUT_VERBS: &[&str] = &[
    "get", "list", "read", "fetch", "search", "query", "find", "describe", "show",
];

const OUTPUT_VERBS: &[&str] = &[
    "send", "create", "write", "update", "delete", "remove", "post", "put", "upload", "notify",
    "publish",
];

/// Server-level inputs to a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    server_id: ServerId,
    transport_kind: &'static str,
    carries_credentials: bool,
    node_type_name: Option<NodeTypeName>,
}

impl ConversionContext {
    /// Builds a context from the owning server's descriptor.
    #[must_use]
    pub fn for_server(descriptor: &ServerDescriptor) -> Self {
        Self {
            server_id: descriptor.id().clone(),
            transport_kind: descriptor.transport().kind(),
            carries_credentials: descriptor.transport().carries_credentials(),
            node_type_name: None,
        }
    }

    /// Overrides the generated name, for conflict-resolved registrations.
    #[must_use]
    pub fn with_node_type_name(mut self, name: NodeTypeName) -> Self {
        self.node_type_name = Some(name);
        self
    }

    /// Returns the owning server.
    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        &self.server_id
    }
}

/// Stateless converter from tool capabilities to node-type descriptors.
///
/// Conversion is total: schema shapes that cannot be classified are
/// downgraded to a JSON editor property and logged, never rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSchemaMapper {
    credential_name: String,
}

impl Default for ToolSchemaMapper {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_NAME)
    }
}

impl ToolSchemaMapper {
    /// Creates a mapper attaching `credential_name` to credentialed servers.
    #[must_use]
    pub fn new(credential_name: impl Into<String>) -> Self {
        Self {
            credential_name: credential_name.into(),
        }
    }

    /// Converts a capability into a descriptor.
    ///
    /// The name defaults to `{server_id}_{tool}` unless the context carries
    /// an override. Exactly one hidden `operation` property pinned to the
    /// tool name is appended.
    #[must_use]
    pub fn convert(
        &self,
        capability: &ToolCapability,
        context: &ConversionContext,
    ) -> NodeTypeDescriptor {
        let tool_name = capability.name();
        let name = context
            .node_type_name
            .clone()
            .unwrap_or_else(|| NodeTypeName::generate(context.server_id.as_str(), tool_name));
        let display_name = capability
            .annotations()
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map_or_else(|| humanize(tool_name), str::to_owned);
        let description = if capability.description().is_empty() {
            format!("{display_name} from {}", context.server_id)
        } else {
            capability.description().to_owned()
        };

        let schema = SchemaNode::parse(capability.input_schema());
        let mut properties: Vec<NodeProperty> = match &schema.kind {
            SchemaKind::Object {
                properties,
                required,
            } => properties
                .iter()
                .map(|(property_name, node)| {
                    convert_property(
                        tool_name,
                        property_name,
                        node,
                        required.contains(property_name),
                    )
                })
                .collect(),
            _ => {
                warn!(
                    tool = tool_name,
                    server_id = %context.server_id,
                    schema_kind = json_kind(capability.input_schema()),
                    "input schema is not an object; node has no editable properties"
                );
                Vec::new()
            }
        };
        let operation = operation_property(tool_name, &properties);
        properties.push(operation);

        NodeTypeDescriptor {
            name,
            display_name,
            description,
            icon: infer_icon(tool_name).to_owned(),
            group: infer_group(capability),
            properties,
            credentials: context.carries_credentials.then(|| CredentialHint {
                name: self.credential_name.clone(),
                required: true,
            }),
            routing: RequestRouting {
                server_id: context.server_id.clone(),
                tool_name: tool_name.to_owned(),
                transport: context.transport_kind.to_owned(),
            },
            hints: capability.annotations().clone(),
        }
    }
}

/// Builds the hidden operation property, underscore-prefixing its name until
/// it no longer clashes with a declared argument.
fn operation_property(tool_name: &str, declared: &[NodeProperty]) -> NodeProperty {
    let mut name = OPERATION_PROPERTY.to_owned();
    while declared.iter().any(|property| property.name == name) {
        name.insert(0, '_');
    }
    let mut property = NodeProperty::new(name, PropertyType::Hidden);
    property.default = Some(Value::String(tool_name.to_owned()));
    property
}

fn convert_property(
    tool_name: &str,
    name: &str,
    node: &SchemaNode,
    required: bool,
) -> NodeProperty {
    let mut property = NodeProperty::new(name, PropertyType::Json);
    property.required = required;
    if let Some(title) = node.meta.title.as_deref().filter(|title| !title.trim().is_empty()) {
        title.trim().clone_into(&mut property.display_name);
    }
    if let Some(description) = &node.meta.description {
        description.trim().clone_into(&mut property.description);
    }
    property.default.clone_from(&node.meta.default);

    match &node.kind {
        SchemaKind::String {
            format,
            min_length,
            max_length,
        } => {
            property.property_type = PropertyType::String;
            property.type_options.min_length = *min_length;
            property.type_options.max_length = *max_length;
            match format {
                Some(StringFormat::Email) => {
                    property.placeholder = Some("name@example.com".to_owned());
                }
                Some(StringFormat::Url) => {
                    property.placeholder = Some("https://example.com".to_owned());
                }
                Some(StringFormat::Password) => property.type_options.password = true,
                Some(StringFormat::DateTime) => {
                    property.placeholder = Some("2024-01-01T00:00:00Z".to_owned());
                }
                Some(StringFormat::Other(_)) | None => {}
            }
        }
        SchemaKind::Number {
            integer,
            minimum,
            maximum,
        } => {
            property.property_type = PropertyType::Number;
            property.type_options.min_value = *minimum;
            property.type_options.max_value = *maximum;
            if *integer {
                property.type_options.number_precision = Some(0);
            }
        }
        SchemaKind::Boolean => {
            property.property_type = PropertyType::Boolean;
            if property.default.is_none() {
                property.default = Some(Value::Bool(false));
            }
        }
        SchemaKind::Enum { values } => {
            property.property_type = PropertyType::Options;
            property.options = options_from(values);
        }
        SchemaKind::Array {
            items,
            min_items,
            max_items,
        } => {
            property.type_options.min_items = *min_items;
            property.type_options.max_items = *max_items;
            if let SchemaKind::Enum { values } = &items.kind {
                property.property_type = PropertyType::MultiOptions;
                property.options = options_from(values);
            } else {
                property.property_type = PropertyType::Json;
                property.type_options.repeatable = true;
            }
        }
        SchemaKind::Object {
            properties,
            required: nested_required,
        } => {
            if properties.is_empty() {
                property.property_type = PropertyType::Json;
            } else {
                property.property_type = PropertyType::Collection;
                property.children = properties
                    .iter()
                    .map(|(child_name, child)| {
                        convert_property(
                            tool_name,
                            child_name,
                            child,
                            nested_required.contains(child_name),
                        )
                    })
                    .collect();
            }
        }
        SchemaKind::Unknown { raw } => {
            warn!(
                tool = tool_name,
                property = name,
                schema_kind = json_kind(raw),
                "unrecognised schema node downgraded to a JSON property"
            );
            property.property_type = PropertyType::Json;
        }
    }

    property
}

fn options_from(values: &[Value]) -> Vec<PropertyOption> {
    values
        .iter()
        .map(|value| PropertyOption {
            name: value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_owned),
            value: value.clone(),
        })
        .collect()
}

fn infer_icon(tool_name: &str) -> &'static str {
    let lowered = tool_name.to_ascii_lowercase();
    ICON_RULES
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(DEFAULT_ICON, |(_, icon)| icon)
}

fn infer_group(capability: &ToolCapability) -> NodeGroup {
    let hints = capability.annotations();
    if hints.is_destructive() {
        return NodeGroup::Output;
    }
    if hints.is_read_only() {
        return NodeGroup::Input;
    }

    let lowered = capability.name().to_ascii_lowercase();
    let leading_word = lowered
        .split(|character: char| !character.is_ascii_alphanumeric())
        .find(|word| !word.is_empty())
        .unwrap_or_default();
    if INPUT_VERBS.iter().any(|verb| leading_word.starts_with(verb)) {
        NodeGroup::Input
    } else if OUTPUT_VERBS.iter().any(|verb| leading_word.starts_with(verb)) {
        NodeGroup::Output
    } else {
        NodeGroup::Transform
    }
}
