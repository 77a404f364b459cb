use std::fmt;

use crate::conversions::numeric::PgNumeric;

/// A decoded column value.
///
/// Source NULLs never reach this type: the row decoder turns them into
/// [`Value::String`] holding an empty string, so every selected column is present in a
/// [`crate::types::Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    F64(f64),
    /// Arbitrary precision `numeric`, kept exact.
    Numeric(PgNumeric),
    String(String),
    /// Nested `json`/`jsonb` document.
    Json(serde_json::Value),
}

impl Value {
    /// Returns the string content of a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the nested object of a [`Value::Json`] holding a JSON object.
    pub fn as_json_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Value::Json(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Returns a short name of the variant, used in error details.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I64(_) => "integer",
            Value::F64(_) => "float",
            Value::Numeric(_) => "numeric",
            Value::String(_) => "string",
            Value::Json(serde_json::Value::Object(_)) => "json object",
            Value::Json(_) => "json",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::I64(value) => write!(f, "{value}"),
            Value::F64(value) => write!(f, "{value}"),
            Value::Numeric(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}
