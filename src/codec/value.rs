//! Stand-in for the host's polymorphic `Common::Data` hierarchy (spec.md
//! §6.2, "consumed" — the core never interprets its internals, only reads
//! and writes it through `Codec`). Since this crate has no host process to
//! borrow a `Data` type from, `Value` is the concrete type the core's own
//! tests and examples pass across that boundary.

use crate::types::ObjectId;

/// The type tag a `Value` carries, one entry per "Supported
/// leaf types". `Decimal` and the four string kinds carry their own sizing
/// parameters because the codec needs them to compute fixed/variable size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafType {
    Int,
    UInt,
    Int64,
    Double,
    /// `precision`/`scale` as in SQL DECIMAL(p, s); stored as a scaled i64.
    Decimal { precision: u8, scale: u8 },
    /// Fixed-width, blank-padded character string, `max_len` bytes.
    CharString { max_len: u16 },
    /// Fixed-width, not blank-padded (trailing content past the encoded
    /// length is undefined, never compared).
    NoPadCharString { max_len: u16 },
    UnicodeString { max_len: u16 },
    NoPadUnicodeString { max_len: u16 },
    DateTime,
    LanguageSet,
    ObjectId,
}

impl LeafType {
    pub fn is_fixed(&self) -> bool {
        !matches!(
            self,
            LeafType::CharString {.. }
            | LeafType::NoPadCharString {.. }
            | LeafType::UnicodeString {.. }
            | LeafType::NoPadUnicodeString {.. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decimal {
    pub unscaled: i64,
    pub scale: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    UInt(u32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal),
    Str(String),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    /// A set of language ids packed into a bitmask, as the original's
    /// `LanguageSet` column does.
    LanguageSet(u64),
    ObjectId(ObjectId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn leaf_type(&self) -> Option<LeafType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(LeafType::Int),
            Value::UInt(_) => Some(LeafType::UInt),
            Value::Int64(_) => Some(LeafType::Int64),
            Value::Double(_) => Some(LeafType::Double),
            Value::Decimal(d) => Some(LeafType::Decimal {
                    precision: 18,
                    scale: d.scale,
            }),
            Value::Str(_) => Some(LeafType::NoPadCharString { max_len: 0 }),
            Value::DateTime(_) => Some(LeafType::DateTime),
            Value::LanguageSet(_) => Some(LeafType::LanguageSet),
            Value::ObjectId(_) => Some(LeafType::ObjectId),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}
