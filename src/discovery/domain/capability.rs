//! Tool capability value objects declared by remote servers.

use super::DiscoveryDomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Behavioural hints a server attaches to a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not modify its environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// The tool may perform destructive updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeated calls with the same arguments have no additional effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool interacts with an open world of external entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    /// Returns whether the tool is declared read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only_hint.unwrap_or(false)
    }

    /// Returns whether the tool is declared destructive.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.destructive_hint.unwrap_or(false)
    }

    fn from_untrusted(value: Option<&Value>) -> Self {
        let Some(Value::Object(object)) = value else {
            return Self::default();
        };
        let flag = |key: &str| object.get(key).and_then(Value::as_bool);

        Self {
            title: object
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_owned),
            read_only_hint: flag("readOnlyHint"),
            destructive_hint: flag("destructiveHint"),
            idempotent_hint: flag("idempotentHint"),
            open_world_hint: flag("openWorldHint"),
        }
    }
}

/// A remote operation declared by a capability-providing server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapability {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_object_schema")]
    input_schema: Value,
    #[serde(default)]
    annotations: ToolAnnotations,
}

fn empty_object_schema() -> Value {
    Value::Object(Map::from_iter([(
        "type".to_owned(),
        Value::String("object".to_owned()),
    )]))
}

impl ToolCapability {
    /// Creates a tool capability.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::EmptyToolName`] when `name` is empty
    /// after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, DiscoveryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(DiscoveryDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
            annotations: ToolAnnotations::default(),
        })
    }

    /// Decodes a capability from an untrusted wire payload.
    ///
    /// Only `name` is mandatory. A non-string description is ignored, a
    /// missing or non-object `inputSchema` is replaced by an empty object
    /// schema, and malformed annotation fields are dropped individually.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::MalformedCapability`] when the payload
    /// is not an object, and [`DiscoveryDomainError::EmptyToolName`] when the
    /// name is missing or blank.
    pub fn from_untrusted(payload: &Value) -> Result<Self, DiscoveryDomainError> {
        let Value::Object(object) = payload else {
            return Err(DiscoveryDomainError::MalformedCapability(format!(
                "expected an object, got {}",
                json_kind(payload)
            )));
        };

        let name = object.get("name").and_then(Value::as_str).unwrap_or("");
        let description = object
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        let input_schema = match object.get("inputSchema") {
            Some(schema @ Value::Object(_)) => schema.clone(),
            _ => empty_object_schema(),
        };

        Ok(Self::new(name, description, input_schema)?
            .with_annotations(ToolAnnotations::from_untrusted(object.get("annotations"))))
    }

    /// Sets behavioural annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the raw input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns behavioural annotations.
    #[must_use]
    pub const fn annotations(&self) -> &ToolAnnotations {
        &self.annotations
    }

    /// Returns a hex SHA-256 digest over the canonical JSON encoding.
    ///
    /// Two capabilities share a fingerprint exactly when their name,
    /// description, schema, and annotations are equal. Object keys are
    /// sorted before hashing, so key order in the payload is ignored.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let encoded = serde_json::to_value(self)
            .map(|value| canonicalize(&value))
            .and_then(|value| serde_json::to_vec(&value))
            .unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<_> = object.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, nested)| (key.clone(), canonicalize(nested)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub(crate) const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untrusted_payload_is_parsed_defensively() {
        let capability = ToolCapability::from_untrusted(&json!({
            "name": "  fetch ",
            "description": 42,
            "inputSchema": "not a schema",
            "annotations": {"readOnlyHint": true, "destructiveHint": "yes"}
        }))
        .expect("payload with a name should parse");

        assert_eq!(capability.name(), "fetch");
        assert_eq!(capability.description(), "");
        assert_eq!(capability.input_schema(), &json!({"type": "object"}));
        assert!(capability.annotations().is_read_only());
        assert_eq!(capability.annotations().destructive_hint, None);
    }

    #[test]
    fn untrusted_payload_without_name_is_rejected() {
        assert_eq!(
            ToolCapability::from_untrusted(&json!({"description": "nameless"})),
            Err(DiscoveryDomainError::EmptyToolName)
        );
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(matches!(
            ToolCapability::from_untrusted(&json!(["fetch"])),
            Err(DiscoveryDomainError::MalformedCapability(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_description_changes() {
        let original = ToolCapability::new("send", "Send a message", json!({"type": "object"}))
            .expect("valid capability");
        let same = original.clone();
        let changed = ToolCapability::new("send", "Send a message now", json!({"type": "object"}))
            .expect("valid capability");

        assert_eq!(original.fingerprint(), same.fingerprint());
        assert_ne!(original.fingerprint(), changed.fingerprint());
        assert_eq!(original.fingerprint().len(), 64);
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let forward = ToolCapability::new(
            "send",
            "Send",
            json!({"type": "object", "properties": {"to": {"type": "string"}, "body": {}}}),
        )
        .expect("valid capability");
        let reversed = ToolCapability::new(
            "send",
            "Send",
            json!({"properties": {"body": {}, "to": {"type": "string"}}, "type": "object"}),
        )
        .expect("valid capability");

        assert_eq!(forward.fingerprint(), reversed.fingerprint());
    }
}
