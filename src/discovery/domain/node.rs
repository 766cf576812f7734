//! Node-type descriptors produced from tool capabilities.

use super::{NodeTypeName, ServerId, ToolAnnotations};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the hidden property that pins the remote operation.
pub const OPERATION_PROPERTY: &str = "operation";

/// Editor type of a node property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    /// Single-line or multi-line text.
    String,
    /// Numeric input.
    Number,
    /// Toggle.
    Boolean,
    /// Single choice from `options`.
    Options,
    /// Multiple choices from `options`.
    MultiOptions,
    /// Structured collection of nested properties.
    Collection,
    /// Free-form JSON editor.
    Json,
    /// Not shown to users.
    Hidden,
}

/// One selectable value of an options property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOption {
    /// Display label.
    pub name: String,
    /// Submitted value.
    pub value: Value,
}

/// Editor-level flags and validation hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOptions {
    /// Mask the input.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub password: bool,
    /// Allow adding multiple values.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repeatable: bool,
    /// Inclusive numeric minimum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Inclusive numeric maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Number of decimal places; `Some(0)` for integers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_precision: Option<u32>,
    /// Minimum text length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum text length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Minimum number of items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    /// Maximum number of items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
}

/// A typed input of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProperty {
    /// Argument name sent to the remote tool.
    pub name: String,
    /// Label shown to users.
    pub display_name: String,
    /// Editor type.
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Whether the argument must be supplied.
    pub required: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Help text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Placeholder hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Choices for options editors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PropertyOption>,
    /// Nested properties for collections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeProperty>,
    /// Editor flags and validation hints.
    #[serde(default)]
    pub type_options: TypeOptions,
}

impl NodeProperty {
    /// Creates a property with empty hints.
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        let property_name = name.into();
        Self {
            display_name: humanize(&property_name),
            name: property_name,
            property_type,
            required: false,
            default: None,
            description: String::new(),
            placeholder: None,
            options: Vec::new(),
            children: Vec::new(),
            type_options: TypeOptions::default(),
        }
    }

    /// Returns whether the property is hidden from users.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.property_type == PropertyType::Hidden
    }
}

/// Palette category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeGroup {
    /// Reads data in.
    Input,
    /// Writes or sends data out.
    Output,
    /// Computes or converts data.
    Transform,
}

/// Credential requirement attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHint {
    /// Credential type name.
    pub name: String,
    /// Whether execution needs the credential.
    pub required: bool,
}

/// Routing metadata that leads execution back to the remote tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRouting {
    /// Owning server.
    pub server_id: ServerId,
    /// Remote tool name.
    pub tool_name: String,
    /// Transport kind of the owning server.
    pub transport: String,
}

/// Display-ready representation of a remote tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDescriptor {
    /// Process-wide unique generated name.
    pub name: NodeTypeName,
    /// Label shown to users.
    pub display_name: String,
    /// Tool description.
    pub description: String,
    /// Icon reference.
    pub icon: String,
    /// Palette group.
    pub group: NodeGroup,
    /// Ordered inputs, ending with the hidden operation property.
    pub properties: Vec<NodeProperty>,
    /// Credential requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialHint>,
    /// Routing back to the remote tool.
    pub routing: RequestRouting,
    /// Behavioural hints copied from the capability.
    #[serde(default)]
    pub hints: ToolAnnotations,
}

impl NodeTypeDescriptor {
    /// Returns the hidden property that pins the remote operation.
    ///
    /// When the tool declares its own `operation` argument the hidden
    /// property carries one or more leading underscores instead.
    #[must_use]
    pub fn operation_property(&self) -> Option<&NodeProperty> {
        self.properties.iter().find(|property| {
            property.is_hidden() && property.name.trim_start_matches('_') == OPERATION_PROPERTY
        })
    }

    /// Returns the remote operation pinned by the hidden property.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation_property()
            .and_then(|property| property.default.as_ref())
            .and_then(Value::as_str)
    }

    /// Returns the properties users can edit.
    pub fn visible_properties(&self) -> impl Iterator<Item = &NodeProperty> {
        self.properties.iter().filter(|property| !property.is_hidden())
    }

    /// Finds a property by argument name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&NodeProperty> {
        self.properties.iter().find(|property| property.name == name)
    }
}

/// Turns `snake_case`, `kebab-case` or `camelCase` into `Title Case`.
#[must_use]
pub fn humanize(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lowercase = false;

    for character in raw.chars() {
        if !character.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lowercase = false;
            continue;
        }
        if character.is_uppercase() && previous_lowercase && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lowercase = character.is_lowercase() || character.is_ascii_digit();
        current.push(character);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut characters = word.chars();
            characters.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(characters).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
