//! Host runtime value model.
//!
//! # Responsibility
//! - Represent the value graph the host runtime exchanges with native code.
//! - Convert structured data between `serde_json::Value` and host values.
//!
//! # Invariants
//! - `Binary` segments are never re-encoded as text.
//! - A `HostValue<'a>` holding borrowed binary views cannot outlive the
//!   storage it borrows from; `into_owned` is the only way to detach it.

use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One node of a host-side value graph.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue<'a> {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Opaque bytes; `Cow::Borrowed` is a zero-copy view into native storage.
    Binary(Cow<'a, [u8]>),
    Array(Vec<HostValue<'a>>),
    Object(BTreeMap<String, HostValue<'a>>),
}

impl<'a> HostValue<'a> {
    pub fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Host-owned copy of `bytes`.
    pub fn binary_owned(bytes: impl Into<Vec<u8>>) -> HostValue<'static> {
        HostValue::Binary(Cow::Owned(bytes.into()))
    }

    /// Zero-copy view over `bytes`.
    pub fn binary_view(bytes: &'a [u8]) -> Self {
        Self::Binary(Cow::Borrowed(bytes))
    }

    /// Looks up one key on an object value.
    pub fn get(&self, key: &str) -> Option<&HostValue<'a>> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes.as_ref()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue<'a>]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type label used in conversion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Returns whether any binary node in this graph is a borrowed view.
    pub fn has_borrowed_binary(&self) -> bool {
        match self {
            Self::Binary(Cow::Borrowed(_)) => true,
            Self::Array(items) => items.iter().any(HostValue::has_borrowed_binary),
            Self::Object(fields) => fields.values().any(HostValue::has_borrowed_binary),
            _ => false,
        }
    }

    /// Detaches the graph from native storage, copying borrowed views.
    pub fn into_owned(self) -> HostValue<'static> {
        match self {
            Self::Null => HostValue::Null,
            Self::Bool(value) => HostValue::Bool(value),
            Self::Number(value) => HostValue::Number(value),
            Self::String(value) => HostValue::String(value),
            Self::Binary(bytes) => HostValue::Binary(Cow::Owned(bytes.into_owned())),
            Self::Array(items) => {
                HostValue::Array(items.into_iter().map(HostValue::into_owned).collect())
            }
            Self::Object(fields) => HostValue::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_owned()))
                    .collect(),
            ),
        }
    }

    /// Builds a host value graph from structured data.
    pub fn from_json(value: &Value) -> HostValue<'static> {
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(flag) => HostValue::Bool(*flag),
            Value::Number(number) => HostValue::Number(number.clone()),
            Value::String(text) => HostValue::String(text.clone()),
            Value::Array(items) => HostValue::Array(items.iter().map(HostValue::from_json).collect()),
            Value::Object(fields) => HostValue::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), HostValue::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Converts this graph back to structured data.
    ///
    /// # Errors
    /// - `ConversionError::UntypedValue` when a binary node is found; binary
    ///   data only travels in the buffer sequence.
    pub fn to_json(&self) -> Result<Value, ConversionError> {
        self.to_json_at("$")
    }

    pub(crate) fn to_json_at(&self, path: &str) -> Result<Value, ConversionError> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Bool(flag) => Ok(Value::Bool(*flag)),
            Self::Number(number) => Ok(Value::Number(number.clone())),
            Self::String(text) => Ok(Value::String(text.clone())),
            Self::Binary(_) => Err(ConversionError::UntypedValue {
                path: path.to_string(),
            }),
            Self::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| item.to_json_at(&format!("{path}[{index}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), value.to_json_at(&format!("{path}.{key}"))?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

impl From<bool> for HostValue<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for HostValue<'_> {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for HostValue<'_> {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<&str> for HostValue<'_> {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue<'_> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<'a> From<Vec<HostValue<'a>>> for HostValue<'a> {
    fn from(value: Vec<HostValue<'a>>) -> Self {
        Self::Array(value)
    }
}

/// Failure while converting between host values and native messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The top-level host value is not a key/value object.
    NotAnObject { found: &'static str },
    /// A required field is absent or `null`.
    MissingField(&'static str),
    /// A field is present but has the wrong shape.
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// The buffer collection is not an indexed collection.
    NotAnArray { found: &'static str },
    /// One buffer element is not interpretable as a binary blob.
    NotBinary { index: usize, found: &'static str },
    /// Binary data found inside a structured field.
    UntypedValue { path: String },
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject { found } => {
                write!(f, "host message must be an object, got {found}")
            }
            Self::MissingField(field) => write!(f, "host message is missing `{field}`"),
            Self::InvalidField {
                field,
                expected,
                found,
            } => write!(f, "host message field `{field}` must be {expected}, got {found}"),
            Self::NotAnArray { found } => {
                write!(f, "host buffers must be an indexed collection, got {found}")
            }
            Self::NotBinary { index, found } => {
                write!(f, "host buffer {index} is not binary data (got {found})")
            }
            Self::UntypedValue { path } => {
                write!(f, "binary value at `{path}` cannot be decoded as structured data")
            }
        }
    }
}

impl Error for ConversionError {}
