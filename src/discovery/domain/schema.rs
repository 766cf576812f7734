//! Closed model of the JSON-Schema subset servers use to describe inputs.
//!
//! Remote schemas are untrusted. [`SchemaNode::parse`] is total: shapes it
//! cannot classify become [`SchemaKind::Unknown`] carrying the raw JSON, so a
//! single odd property never fails a whole conversion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recognised string formats that carry an input hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringFormat {
    /// An email address.
    Email,
    /// A URL or URI.
    Url,
    /// A secret that should be masked.
    Password,
    /// A calendar date or timestamp.
    DateTime,
    /// Any other declared format, kept verbatim.
    Other(String),
}

impl StringFormat {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "email" | "idn-email" => Self::Email,
            "url" | "uri" | "iri" | "uri-reference" => Self::Url,
            "password" => Self::Password,
            "date" | "date-time" | "time" => Self::DateTime,
            _ => Self::Other(raw.to_owned()),
        }
    }
}

/// Annotations every schema node may carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMeta {
    /// Short title.
    pub title: Option<String>,
    /// Longer description.
    pub description: Option<String>,
    /// Declared default value.
    pub default: Option<Value>,
}

/// Shape of a schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaKind {
    /// Free text.
    String {
        /// Declared format, if any.
        format: Option<StringFormat>,
        /// Minimum length.
        min_length: Option<u64>,
        /// Maximum length.
        max_length: Option<u64>,
    },
    /// Numeric value.
    Number {
        /// Whether only integers are accepted.
        integer: bool,
        /// Inclusive lower bound.
        minimum: Option<f64>,
        /// Inclusive upper bound.
        maximum: Option<f64>,
    },
    /// True or false.
    Boolean,
    /// One of a fixed list of values, order preserved.
    Enum {
        /// Allowed values.
        values: Vec<Value>,
    },
    /// Homogeneous list.
    Array {
        /// Item schema.
        items: Box<SchemaNode>,
        /// Minimum number of items.
        min_items: Option<u64>,
        /// Maximum number of items.
        max_items: Option<u64>,
    },
    /// Structured object.
    Object {
        /// Named properties in schema order.
        properties: Vec<(String, SchemaNode)>,
        /// Names of required properties.
        required: Vec<String>,
    },
    /// A shape this model does not classify.
    Unknown {
        /// Raw schema as received.
        raw: Value,
    },
}

/// A parsed schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Shared annotations.
    pub meta: SchemaMeta,
    /// Node shape.
    pub kind: SchemaKind,
}

impl SchemaNode {
    /// Parses an arbitrary JSON value into a schema node.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        let Value::Object(object) = value else {
            return Self::unknown(value.clone());
        };

        let meta = SchemaMeta {
            title: string_field(object, "title"),
            description: string_field(object, "description"),
            default: object.get("default").cloned(),
        };

        if let Some(Value::Array(values)) = object.get("enum") {
            return Self {
                meta,
                kind: SchemaKind::Enum {
                    values: values.clone(),
                },
            };
        }

        let kind = match declared_type(object).as_deref() {
            Some("string") => SchemaKind::String {
                format: string_field(object, "format").map(|raw| StringFormat::parse(&raw)),
                min_length: u64_field(object, "minLength"),
                max_length: u64_field(object, "maxLength"),
            },
            Some(numeric @ ("number" | "integer")) => SchemaKind::Number {
                integer: numeric == "integer",
                minimum: object.get("minimum").and_then(Value::as_f64),
                maximum: object.get("maximum").and_then(Value::as_f64),
            },
            Some("boolean") => SchemaKind::Boolean,
            Some("array") => SchemaKind::Array {
                items: Box::new(
                    object
                        .get("items")
                        .map_or_else(|| Self::unknown(Value::Null), Self::parse),
                ),
                min_items: u64_field(object, "minItems"),
                max_items: u64_field(object, "maxItems"),
            },
            Some("object") => Self::parse_object(object),
            None if object.contains_key("properties") => Self::parse_object(object),
            _ => SchemaKind::Unknown { raw: value.clone() },
        };

        Self { meta, kind }
    }

    /// Returns the top-level object properties, or nothing for other shapes.
    #[must_use]
    pub fn properties(&self) -> &[(String, Self)] {
        match &self.kind {
            SchemaKind::Object { properties, .. } => properties,
            _ => &[],
        }
    }

    /// Returns the names of required top-level properties.
    #[must_use]
    pub fn required(&self) -> &[String] {
        match &self.kind {
            SchemaKind::Object { required, .. } => required,
            _ => &[],
        }
    }

    const fn unknown(raw: Value) -> Self {
        Self {
            meta: SchemaMeta {
                title: None,
                description: None,
                default: None,
            },
            kind: SchemaKind::Unknown { raw },
        }
    }

    fn parse_object(object: &Map<String, Value>) -> SchemaKind {
        let properties = match object.get("properties") {
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(name, schema)| (name.clone(), Self::parse(schema)))
                .collect(),
            _ => Vec::new(),
        };
        let required = match object.get("required") {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };

        SchemaKind::Object {
            properties,
            required,
        }
    }
}

/// Resolves `type`, accepting `["string", "null"]` style unions.
fn declared_type(object: &Map<String, Value>) -> Option<String> {
    match object.get("type")? {
        Value::String(name) => Some(name.clone()),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null")
            .map(str::to_owned),
        _ => None,
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn u64_field(object: &Map<String, Value>, key: &str) -> Option<u64> {
    object.get(key).and_then(Value::as_u64)
}
