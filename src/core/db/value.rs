/// Value Module
///
/// Typed values exchanged with a driver, both as bound parameters and as
/// column values read from a cursor, together with the lenient conversions
/// the typed column getters rely on.

use crate::core::{DjapiError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

/// Text layout used when a timestamp is stored as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const TIMESTAMP_PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A single SQL value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns true for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Boolean(_) => "BOOLEAN",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Converts the value to an integer.
    ///
    /// Reals are truncated, booleans become 0/1 and text is parsed.
    /// Returns `Ok(None)` for SQL NULL.
    pub fn as_int(&self) -> Result<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            Value::Boolean(b) => Ok(Some(i64::from(*b))),
            Value::Real(f) if f.is_finite() => Ok(Some(f.trunc() as i64)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| mismatch(self, "integer")),
            _ => Err(mismatch(self, "integer")),
        }
    }

    /// Converts the value to a string.
    ///
    /// Every non-NULL value except non-UTF-8 blobs has a text form.
    pub fn as_string(&self) -> Result<Option<String>> {
        match self {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Blob(b) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|_| mismatch(self, "string")),
            other => Ok(Some(other.to_string())),
        }
    }

    /// Converts the value to a boolean.
    ///
    /// Numbers are true when non-zero; text accepts `true`/`false`/`1`/`0`
    /// in any case.
    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Integer(i) => Ok(Some(*i != 0)),
            Value::Real(f) => Ok(Some(*f != 0.0)),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(mismatch(self, "boolean")),
            },
            _ => Err(mismatch(self, "boolean")),
        }
    }

    /// Converts the value to a timestamp.
    ///
    /// Text is parsed as `YYYY-MM-DD HH:MM:SS[.fff]` (a `T` separator and
    /// RFC 3339 offsets are accepted, a bare date means midnight); integers
    /// are milliseconds since the Unix epoch.
    pub fn as_timestamp(&self) -> Result<Option<NaiveDateTime>> {
        match self {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            Value::Integer(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(|dt| Some(dt.naive_utc()))
                .ok_or_else(|| mismatch(self, "timestamp")),
            Value::Text(s) => parse_timestamp(s.trim())
                .map(Some)
                .ok_or_else(|| mismatch(self, "timestamp")),
            _ => Err(mismatch(self, "timestamp")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    for format in TIMESTAMP_PARSE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn mismatch(value: &Value, wanted: &str) -> DjapiError {
    DjapiError::Read(format!(
        "cannot convert {} value '{}' to {}",
        value.type_name(),
        value,
        wanted
    ))
}
