//! SQL parameter values
//!
//! Scalar value representation for positional statement parameters
//! (`$1`, `$2`, ...) and result rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A row of values (useful for result sets)
pub type Row = Vec<SqlValue>;

/// Scalar SQL value sent as a statement parameter or returned in a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    // Null
    Null,
    // Boolean
    Bool(bool),
    // Integer types
    I32(i32),
    I64(i64),
    // Float
    F64(f64),
    // Decimal
    Decimal(Decimal),
    // String
    Text(String),
    // Date/Time types
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    // Special types
    Uuid(Uuid),
    Bytea(Vec<u8>),
    // JSON (schemaless)
    Json(serde_json::Value),
}

impl SqlValue {
    /// Create a null value
    pub fn null() -> Self {
        SqlValue::Null
    }

    /// Whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Extract a string slice, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an i64, widening smaller integer types
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a bool, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(true) => write!(f, "TRUE"),
            SqlValue::Bool(false) => write!(f, "FALSE"),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            SqlValue::Date(v) => write!(f, "'{}'", v),
            SqlValue::Time(v) => write!(f, "'{}'", v),
            SqlValue::Timestamp(v) => write!(f, "'{}'", v),
            SqlValue::Uuid(v) => write!(f, "'{}'", v),
            SqlValue::Bytea(v) => {
                write!(f, "'\\x")?;
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, "'")
            }
            SqlValue::Json(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytea(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}
