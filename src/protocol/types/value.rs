//! Oracle value types for query results and binds.

use crate::protocol::decode::{IntervalDS, IntervalYM, JsonValue, VectorValue};
use crate::protocol::types::lob::LobValue;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use std::fmt;

/// A named-object value: the type's OID plus its undecoded attribute image.
///
/// Attribute decoding goes through the connection's object type cache, which
/// knows the attribute order for the OID.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    /// 16-byte object type OID.
    pub type_oid: Vec<u8>,
    /// Raw attribute image as sent by the server.
    pub image: Vec<u8>,
}

/// A single column or bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleValue {
    /// NULL value.
    Null,
    /// String value (VARCHAR2, CHAR, LONG and friends).
    String(String),
    /// Raw bytes (RAW, LONG RAW).
    Bytes(Bytes),
    /// NUMBER kept as a decimal string, preserving precision.
    Number(String),
    /// NUMBER narrowed to an integer (scale 0, precision within i64).
    Integer(i64),
    /// BINARY_FLOAT.
    Float(f32),
    /// BINARY_DOUBLE, or NUMBER widened to f64.
    Double(f64),
    /// BOOLEAN (PL/SQL and 23ai SQL).
    Bool(bool),
    /// DATE.
    Date(NaiveDateTime),
    /// TIMESTAMP / TIMESTAMP WITH LOCAL TIME ZONE.
    Timestamp(NaiveDateTime),
    /// TIMESTAMP WITH TIME ZONE.
    TimestampTz(DateTime<FixedOffset>),
    /// INTERVAL DAY TO SECOND.
    IntervalDS(IntervalDS),
    /// INTERVAL YEAR TO MONTH.
    IntervalYM(IntervalYM),
    /// ROWID / UROWID rendered in the base-64 form.
    Rowid(String),
    /// CLOB/BLOB/BFILE: locator plus optionally prefetched data.
    Lob(LobValue),
    /// JSON (OSON) document.
    Json(JsonValue),
    /// VECTOR value.
    Vector(VectorValue),
    /// Named object type instance.
    Object(ObjectValue),
}

impl OracleValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, OracleValue::Null)
    }

    /// Get the value as a string reference, when it has a textual form.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OracleValue::String(s) => Some(s),
            OracleValue::Number(s) => Some(s),
            OracleValue::Rowid(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to i64, when the value is numeric and integral.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            OracleValue::Integer(v) => Some(*v),
            OracleValue::Number(s) => s.parse().ok(),
            OracleValue::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            OracleValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Convert to f64, when the value is numeric.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            OracleValue::Integer(v) => Some(*v as f64),
            OracleValue::Number(s) => s.parse().ok(),
            OracleValue::Float(v) => Some(*v as f64),
            OracleValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a date/time.
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            OracleValue::Date(dt) | OracleValue::Timestamp(dt) => Some(*dt),
            OracleValue::TimestampTz(dt) => Some(dt.naive_utc()),
            _ => None,
        }
    }

    /// Get the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OracleValue::Bytes(b) => Some(b),
            OracleValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Get the value as a LOB, when it is one.
    pub fn as_lob(&self) -> Option<&LobValue> {
        match self {
            OracleValue::Lob(lob) => Some(lob),
            _ => None,
        }
    }
}

impl fmt::Display for OracleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleValue::Null => write!(f, "NULL"),
            OracleValue::String(s) => write!(f, "{}", s),
            OracleValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            OracleValue::Number(n) => write!(f, "{}", n),
            OracleValue::Integer(v) => write!(f, "{}", v),
            OracleValue::Float(v) => write!(f, "{}", v),
            OracleValue::Double(v) => write!(f, "{}", v),
            OracleValue::Bool(b) => write!(f, "{}", b),
            OracleValue::Date(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            OracleValue::Timestamp(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.9f")),
            OracleValue::TimestampTz(dt) => write!(f, "{}", dt.to_rfc3339()),
            OracleValue::IntervalDS(iv) => write!(
                f,
                "{} {:02}:{:02}:{:02}.{:09}",
                iv.days, iv.hours, iv.minutes, iv.seconds, iv.nanoseconds.unsigned_abs()
            ),
            OracleValue::IntervalYM(iv) => write!(f, "{}-{}", iv.years, iv.months),
            OracleValue::Rowid(s) => write!(f, "{}", s),
            OracleValue::Lob(lob) => write!(f, "<LOB {} bytes>", lob.size()),
            OracleValue::Json(_) => write!(f, "<JSON>"),
            OracleValue::Vector(v) => write!(f, "<VECTOR[{}]>", v.dimensions()),
            OracleValue::Object(o) => write!(f, "<OBJECT {} bytes>", o.image.len()),
        }
    }
}

/// Conversions used when binding Rust values.
impl From<i64> for OracleValue {
    fn from(v: i64) -> Self {
        OracleValue::Integer(v)
    }
}

impl From<i32> for OracleValue {
    fn from(v: i32) -> Self {
        OracleValue::Integer(v as i64)
    }
}

impl From<f64> for OracleValue {
    fn from(v: f64) -> Self {
        OracleValue::Double(v)
    }
}

impl From<bool> for OracleValue {
    fn from(v: bool) -> Self {
        OracleValue::Bool(v)
    }
}

impl From<&str> for OracleValue {
    fn from(v: &str) -> Self {
        OracleValue::String(v.to_string())
    }
}

impl From<String> for OracleValue {
    fn from(v: String) -> Self {
        OracleValue::String(v)
    }
}

impl From<NaiveDateTime> for OracleValue {
    fn from(v: NaiveDateTime) -> Self {
        OracleValue::Date(v)
    }
}

impl<T: Into<OracleValue>> From<Option<T>> for OracleValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => OracleValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null() {
        let val = OracleValue::Null;
        assert!(val.is_null());
        assert_eq!(val.as_str(), None);
        assert_eq!(format!("{}", val), "NULL");
    }

    #[test]
    fn test_number_conversions() {
        let val = OracleValue::Number("123.45".to_string());
        assert_eq!(val.to_i64(), None);
        assert_eq!(val.to_f64(), Some(123.45));

        let int_val = OracleValue::Integer(42);
        assert_eq!(int_val.to_i64(), Some(42));
        assert_eq!(int_val.to_f64(), Some(42.0));
    }

    #[test]
    fn test_from_option() {
        let val: OracleValue = Option::<i64>::None.into();
        assert!(val.is_null());
        let val: OracleValue = Some(5i64).into();
        assert_eq!(val.to_i64(), Some(5));
    }
}
