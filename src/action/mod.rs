// SPDX-License-Identifier: MIT

//! Action contract consumed by jobs
//!
//! An action declares the parameters it accepts and the fields its
//! response exposes, and can be invoked with resolved arguments.

mod registry;

pub use registry::ActionRegistry;
pub(crate) use registry::validate_contract;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ActionError;

/// Resolved arguments passed to an action, keyed by parameter name
pub type Arguments = IndexMap<String, Value>;

/// Trait for invocable units of work.
///
/// `parameters()` and `response_fields()` return slices so implementations
/// can keep their declarations in struct fields or statics.
#[async_trait]
pub trait Action: Send + Sync {
    /// Identifier the action is registered under
    fn name(&self) -> &str;

    /// Declared input parameters
    fn parameters(&self) -> &[Parameter];

    /// Declared response fields
    fn response_fields(&self) -> &[Field];

    /// Run the action with resolved arguments
    async fn invoke(&self, arguments: Arguments) -> Result<Response, ActionError>;

    /// Look up a declared parameter by name
    fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters().iter().find(|p| p.name == name)
    }

    /// Look up a declared response field by name
    fn response_field(&self, name: &str) -> Option<&Field> {
        self.response_fields().iter().find(|f| f.name == name)
    }
}

/// Value types understood by parameter and field declarations
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Check whether a concrete value fits this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }

    /// Check whether values of `other` can always be used where `self` is expected
    pub fn accepts(&self, other: &ParamType) -> bool {
        match (self, other) {
            (ParamType::Any, _) | (_, ParamType::Any) => true,
            (ParamType::Number, ParamType::Integer) => true,
            (a, b) => a == b,
        }
    }

    /// Name of the JSON type of a value, for diagnostics
    pub fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::Any => "any",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// A declared input parameter
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Parameter {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
        }
    }
}

/// A declared response field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: ParamType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: ParamType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Named output fields produced by an action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response {
    fields: IndexMap<String, Value>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The whole response as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Response {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<Map<String, Value>> for Response {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}
