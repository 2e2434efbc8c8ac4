//! Schemas — declarative validation for structured model output and tool input.
//!
//! A [`Schema`] turns an untyped JSON value into its output type or a list
//! of [`SchemaIssue`]s. Coercion and defaulting belong to the schema itself:
//! [`JsonSchema`] fills in declared `default` values, [`TypedSchema`] defers
//! to the serde attributes on its target type. The extractor adds nothing on
//! top.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One schema violation: where it happened and what was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// JSON pointer to the offending value ("/" for the root).
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "/".into() } else { path },
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The schema document itself could not be compiled.
#[derive(Debug, Clone, Error)]
#[error("invalid JSON schema: {0}")]
pub struct SchemaError(pub String);

/// Validates (and possibly coerces) a JSON value into `Output`.
pub trait Schema: Send + Sync {
    type Output;

    /// JSON Schema document describing the accepted shape (sent to models).
    fn descriptor(&self) -> Value;

    /// Validate `value`, applying this schema's own defaulting/coercion rules.
    fn validate(&self, value: Value) -> Result<Self::Output, Vec<SchemaIssue>>;
}

/// A compiled JSON Schema document.
#[derive(Clone)]
pub struct JsonSchema {
    document: Value,
    validator: Arc<jsonschema::Validator>,
}

impl JsonSchema {
    /// Compile a schema document.
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let validator =
            jsonschema::validator_for(&document).map_err(|e| SchemaError(e.to_string()))?;
        Ok(Self {
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl std::fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish()
    }
}

impl Schema for JsonSchema {
    type Output = Value;

    fn descriptor(&self) -> Value {
        self.document.clone()
    }

    fn validate(&self, mut value: Value) -> Result<Value, Vec<SchemaIssue>> {
        apply_defaults(&self.document, &mut value);
        let issues: Vec<SchemaIssue> = self
            .validator
            .iter_errors(&value)
            .map(|e| SchemaIssue::new(e.instance_path.to_string(), e.to_string()))
            .collect();
        if issues.is_empty() {
            Ok(value)
        } else {
            Err(issues)
        }
    }
}

/// Fill absent object properties from their declared `default`, recursively.
fn apply_defaults(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(map) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return;
            };
            for (key, prop_schema) in properties {
                match map.get_mut(key) {
                    Some(existing) => apply_defaults(prop_schema, existing),
                    None => {
                        if let Some(default) = prop_schema.get("default") {
                            map.insert(key.clone(), default.clone());
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
                for item in items {
                    apply_defaults(item_schema, item);
                }
            }
        }
        _ => {}
    }
}

/// A schema whose output is a Rust type deserialised with serde.
///
/// An optional structural [`JsonSchema`] runs first so callers get every
/// violation with its path; serde then produces `T`, honouring whatever
/// `#[serde(default)]` / `deserialize_with` rules `T` declares.
pub struct TypedSchema<T> {
    structure: Option<JsonSchema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSchema<T> {
    /// Validate by deserialisation only.
    pub fn new() -> Self {
        Self {
            structure: None,
            _marker: PhantomData,
        }
    }

    /// Validate against `document` first, then deserialise.
    pub fn with_structure(document: Value) -> Result<Self, SchemaError> {
        Ok(Self {
            structure: Some(JsonSchema::new(document)?),
            _marker: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Schema for TypedSchema<T> {
    type Output = T;

    fn descriptor(&self) -> Value {
        self.structure
            .as_ref()
            .map(JsonSchema::descriptor)
            .unwrap_or_else(|| serde_json::json!({}))
    }

    fn validate(&self, value: Value) -> Result<T, Vec<SchemaIssue>> {
        let value = match &self.structure {
            Some(structure) => structure.validate(value)?,
            None => value,
        };
        serde_json::from_value(value).map_err(|e| vec![SchemaIssue::new("/", e.to_string())])
    }
}

/// Reusable declarative coercion rules for [`TypedSchema`] targets.
pub mod coerce {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    /// Accept `true`, `"true"`, `"yes"`, `"1"`, `1` (and their negatives) as a bool.
    ///
    /// Use with `#[serde(deserialize_with = "coerce::lenient_bool")]`.
    pub fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Loose::deserialize(deserializer)? {
            Loose::Bool(b) => Ok(b),
            Loose::Int(1) => Ok(true),
            Loose::Int(0) => Ok(false),
            Loose::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "on" => Ok(true),
                "false" | "no" | "n" | "0" | "off" => Ok(false),
                other => Err(D::Error::custom(format!("expected a boolean, got \"{other}\""))),
            },
            Loose::Int(n) => Err(D::Error::custom(format!("expected a boolean, got {n}"))),
            Loose::Float(n) => Err(D::Error::custom(format!("expected a boolean, got {n}"))),
        }
    }

    /// Accept a JSON number or a numeric string as `f64`.
    pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Loose::deserialize(deserializer)? {
            Loose::Int(n) => Ok(n as f64),
            Loose::Float(n) => Ok(n),
            Loose::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("expected a number, got \"{s}\""))),
            Loose::Bool(b) => Err(D::Error::custom(format!("expected a number, got {b}"))),
        }
    }
}
