//! Conversions between Rust types and [`Value`]

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use super::Value;
use crate::error::{QuarryError, Result};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Fallible extraction of a Rust value from a [`Value`]
///
/// `Null` only converts into `Option<T>` (or `Value` itself); every other target
/// returns [`QuarryError::Conversion`] for it.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Marker for value types that expose numeric functions (`abs`, `sum`, `avg`, …)
pub trait Numeric {}

/// Marker for value types that expose string functions (`upper`, `trim`, …)
pub trait Textual {}

fn mismatch(expected: &str, value: &Value) -> QuarryError {
    QuarryError::Conversion(format!("expected {expected}, got {}", value.kind()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch("i64", &value)),
            other => Err(mismatch("i64", &other)),
        }
    }
}

macro_rules! impl_narrow_integer {
    ($($type:ty),*) => {
        $(
            impl FromValue for $type {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$type>::try_from(wide).map_err(|_| {
                        QuarryError::Conversion(format!(
                            "{wide} out of range for {}",
                            stringify!($type)
                        ))
                    })
                }
            }

            impl From<$type> for Value {
                fn from(value: $type) -> Self {
                    Value::Integer(i64::from(value))
                }
            }

            impl Numeric for $type {}
            impl Numeric for Option<$type> {}
        )*
    };
}

impl_narrow_integer!(i8, i16, i32, u8, u16, u32);

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl Numeric for i64 {}
impl Numeric for Option<i64> {}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            Value::Text(ref s) => s.trim().parse().map_err(|_| mismatch("f64", &value)),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Real(f64::from(value))
    }
}

impl Numeric for f64 {}
impl Numeric for Option<f64> {}
impl Numeric for f32 {}
impl Numeric for Option<f32> {}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Integer(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            // SQLite column affinity can hand back numbers for TEXT columns
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl Textual for String {}
impl Textual for Option<String> {}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map(|naive| naive.and_utc())
                })
                .map_err(|_| mismatch("timestamp", &value)),
            Value::Integer(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| QuarryError::Conversion(format!("{secs} is not a valid timestamp"))),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Text(value.to_rfc3339())
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|_| mismatch("datetime", &value)),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Text(value.format(DATETIME_FORMAT).to_string())
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch("date", &value))
            }
            other => Err(mismatch("date", &other)),
        }
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Text(value.format("%Y-%m-%d").to_string())
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => {
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| mismatch("time", &value))
            }
            other => Err(mismatch("time", &other)),
        }
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Text(value.format("%H:%M:%S%.f").to_string())
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => Uuid::parse_str(s).map_err(|_| mismatch("uuid", &value)),
            Value::Blob(ref b) => Uuid::from_slice(b).map_err(|_| mismatch("uuid", &value)),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Text(value.hyphenated().to_string())
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(ref s) => Decimal::from_str(s).map_err(|_| mismatch("decimal", &value)),
            Value::Integer(i) => Ok(Decimal::from(i)),
            Value::Real(f) => Decimal::try_from(f)
                .map_err(|e| QuarryError::Conversion(format!("{f} is not a decimal: {e}"))),
            other => Err(mismatch("decimal", &other)),
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Text(value.to_string())
    }
}

impl Numeric for Decimal {}
impl Numeric for Option<Decimal> {}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(serde_json::from_str(&s)?),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Text(value.to_string())
    }
}
