use std::fmt;

/// Property value with owned data.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// Owned string.
    Str(String),
    /// Owned byte vector.
    Bytes(Vec<u8>),
    /// Date value represented as Unix timestamp (days since epoch).
    Date(i64),
    /// DateTime value represented as Unix timestamp (milliseconds since epoch).
    DateTime(i64),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Str(v) => write!(f, "{v}"),
            PropValue::Bytes(v) => write!(f, "bytes(len={})", v.len()),
            PropValue::Date(v) => write!(f, "date({v})"),
            PropValue::DateTime(v) => write!(f, "datetime({v})"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}
