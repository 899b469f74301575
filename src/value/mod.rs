//! Value type system for quarry
//!
//! Every parameter bound into a statement and every column read back from a row
//! travels as a [`Value`]. Drivers translate between `Value` and their native
//! representations; entities translate between `Value` and their fields through
//! [`FromValue`] and the `From` impls in [`convert`].
//!
//! - **`Value`** - the SQL scalar (null, boolean, integer, real, text, blob)
//! - **`FieldType`** - declared column type used for DDL and driver parameter typing
//! - **`FromValue`** - fallible extraction of a Rust type from a `Value`

pub mod convert;

use std::fmt;
use std::hash::{Hash, Hasher};

pub use convert::{FromValue, Numeric, Textual};

/// A SQL scalar value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in conversion errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Integer(_) => "Integer",
            Value::Real(_) => "Real",
            Value::Text(_) => "Text",
            Value::Blob(_) => "Blob",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts into `T`, see [`FromValue`]
    pub fn into_typed<T: FromValue>(self) -> crate::Result<T> {
        T::from_value(self)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
        }
    }
}

// Reals compare by bit pattern so that `Value` can be used in hashed query keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Real(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Blob(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Declared storage type of an attribute
///
/// Drives DDL column types and, for PostgreSQL, how a [`Value`] is encoded when the
/// server expects a specific parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Text,
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
}

impl FieldType {
    pub fn is_integral(&self) -> bool {
        matches!(self, FieldType::SmallInt | FieldType::Integer | FieldType::BigInt)
    }

    /// Whether a value written to a column of this type reads back equal on every
    /// platform. Floating point, decimal and temporal columns may be rounded or
    /// reformatted by the database.
    pub fn reads_back_exactly(&self) -> bool {
        matches!(
            self,
            FieldType::Boolean
                | FieldType::SmallInt
                | FieldType::Integer
                | FieldType::BigInt
                | FieldType::Text
                | FieldType::Varchar
                | FieldType::Blob
        )
    }
}
