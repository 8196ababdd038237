use crate::storage::PropValue;
use crate::types::{LabelId, PenumbraError, PropId, Result};

/// Logical type of the indexed property value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TypeTag {
    /// Null.
    Null,
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Bytes,
    /// Days since epoch.
    Date,
    /// Milliseconds since epoch.
    DateTime,
}

impl TypeTag {
    /// Type tag of `value`.
    pub fn of(value: &PropValue) -> TypeTag {
        match value {
            PropValue::Null => TypeTag::Null,
            PropValue::Bool(_) => TypeTag::Bool,
            PropValue::Int(_) => TypeTag::Int,
            PropValue::Float(_) => TypeTag::Float,
            PropValue::Str(_) => TypeTag::String,
            PropValue::Bytes(_) => TypeTag::Bytes,
            PropValue::Date(_) => TypeTag::Date,
            PropValue::DateTime(_) => TypeTag::DateTime,
        }
    }
}

/// Definition supplied when creating a property index.
///
/// A unique index doubles as a uniqueness constraint on
/// `(label, prop, value)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct IndexDef {
    /// Indexed label.
    pub label: LabelId,
    /// Indexed property key.
    pub prop: PropId,
    /// Value type admitted by the index.
    pub ty: TypeTag,
    /// Whether at most one node may hold each value.
    pub unique: bool,
}

impl IndexDef {
    /// Non-unique index on `(label, prop)`.
    pub fn plain(label: LabelId, prop: PropId, ty: TypeTag) -> Self {
        Self {
            label,
            prop,
            ty,
            unique: false,
        }
    }

    /// Uniqueness constraint on `(label, prop)`.
    pub fn unique(label: LabelId, prop: PropId, ty: TypeTag) -> Self {
        Self {
            label,
            prop,
            ty,
            unique: true,
        }
    }

    /// Whether `value` can be stored in and looked up through this index.
    ///
    /// Values of another type and NaN never qualify; lookups for them must
    /// scan instead.
    pub fn admits(&self, value: &PropValue) -> bool {
        TypeTag::of(value) == self.ty && !matches!(value, PropValue::Float(v) if v.is_nan())
    }

    pub(crate) fn key(&self) -> (LabelId, PropId) {
        (self.label, self.prop)
    }
}

/// Order-preserving key for an indexed value of type `ty`.
pub(crate) fn encode_value_key(ty: TypeTag, value: &PropValue) -> Result<Vec<u8>> {
    match (ty, value) {
        (TypeTag::Null, PropValue::Null) => Ok(Vec::new()),
        (TypeTag::Bool, PropValue::Bool(v)) => Ok(vec![u8::from(*v)]),
        (TypeTag::Int, PropValue::Int(v)) => Ok(encode_i64_key(*v).to_vec()),
        (TypeTag::Float, PropValue::Float(v)) => encode_f64_key(*v),
        (TypeTag::String, PropValue::Str(s)) => encode_bytes_key(s.as_bytes()),
        (TypeTag::Bytes, PropValue::Bytes(b)) => encode_bytes_key(b),
        (TypeTag::Date, PropValue::Date(v)) => Ok(encode_i64_key(*v).to_vec()),
        (TypeTag::DateTime, PropValue::DateTime(v)) => Ok(encode_i64_key(*v).to_vec()),
        _ => Err(PenumbraError::Invalid(
            "property value type mismatch for index",
        )),
    }
}

fn encode_i64_key(value: i64) -> [u8; 8] {
    ((value as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

fn encode_f64_key(value: f64) -> Result<Vec<u8>> {
    if value.is_nan() {
        return Err(PenumbraError::Invalid("NaN values cannot be indexed"));
    }
    // -0.0 == 0.0, so both share one key.
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let normalized = if bits & 0x8000_0000_0000_0000 != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    Ok(normalized.to_be_bytes().to_vec())
}

fn encode_bytes_key(bytes: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| PenumbraError::Invalid("property value exceeds maximum length"))?;
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}
