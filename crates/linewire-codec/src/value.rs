use std::fmt;

use crate::error::{CodecError, Result};

/// Wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    String = 1,
    Integer = 2,
    Double = 3,
    Bool = 4,
    List = 5,
    Struct = 6,
    Void = 7,
    Error = 8,
}

impl FieldType {
    /// The numeric tag written on the wire.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a type by its numeric tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => FieldType::String,
            2 => FieldType::Integer,
            3 => FieldType::Double,
            4 => FieldType::Bool,
            5 => FieldType::List,
            6 => FieldType::Struct,
            7 => FieldType::Void,
            8 => FieldType::Error,
            _ => return None,
        })
    }

    /// Parse a tag line (without its newline).
    pub fn parse(line: &str) -> Result<Self> {
        line.parse::<u8>()
            .ok()
            .and_then(Self::from_tag)
            .ok_or_else(|| CodecError::UnknownTag(line.to_string()))
    }

    /// Whether this type carries nested fields.
    pub fn is_container(self) -> bool {
        matches!(self, FieldType::List | FieldType::Struct)
    }

    /// Whether this type may appear as a struct field or list element.
    pub fn is_member(self) -> bool {
        !matches!(self, FieldType::Void | FieldType::Error)
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::List => "list",
            FieldType::Struct => "struct",
            FieldType::Void => "void",
            FieldType::Error => "error",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically-typed value tree.
///
/// Struct fields keep insertion order; that order is the wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Double(f64),
    Bool(bool),
    /// Homogeneous list. Mixed element types are rejected when encoding.
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
    /// Empty payload. Only valid at the top level.
    Void,
    /// Remote error. Only valid at the top level.
    Error { code: i64, message: String },
}

impl Value {
    /// Build a struct from `(name, value)` pairs, in order.
    pub fn structure<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Build a remote error value.
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Value::Error {
            code,
            message: message.into(),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Value::String(_) => FieldType::String,
            Value::Integer(_) => FieldType::Integer,
            Value::Double(_) => FieldType::Double,
            Value::Bool(_) => FieldType::Bool,
            Value::List(_) => FieldType::List,
            Value::Struct(_) => FieldType::Struct,
            Value::Void => FieldType::Void,
            Value::Error { .. } => FieldType::Error,
        }
    }

    /// Look up a struct field by name. `None` for non-structs.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Doubles, or integers widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
