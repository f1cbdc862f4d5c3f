//! Storage-native scalar values
//!
//! [`Datum`] is the value side of a flattened attribute: the closed set of
//! scalar shapes the backing store understands, plus a one-level list for
//! multi-valued attributes (the flattened form of embedded collections).
//!
//! Two comparison regimes coexist:
//! - `PartialEq` is strict: values of different variants are never equal,
//!   and float equality is IEEE (`NaN != NaN`).
//! - [`Datum::query_cmp`] is the total order used by filters and sorts:
//!   variants rank in a fixed order, ints and floats compare numerically,
//!   and `NaN` sorts after every other number.

use crate::key::Key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// The variant tag of a [`Datum`], used by converter lookup and shape checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatumKind {
    /// Explicit null
    Null,
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit IEEE float
    Float,
    /// UTF-8 text
    Text,
    /// Opaque bytes
    Blob,
    /// UTC timestamp
    Stamp,
    /// Reference to another record's key
    Ref,
    /// Multi-valued attribute (one level; elements are scalar)
    List,
}

impl DatumKind {
    /// Human-readable kind name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            DatumKind::Null => "null",
            DatumKind::Bool => "bool",
            DatumKind::Int => "int",
            DatumKind::Float => "float",
            DatumKind::Text => "text",
            DatumKind::Blob => "blob",
            DatumKind::Stamp => "stamp",
            DatumKind::Ref => "ref",
            DatumKind::List => "list",
        }
    }

    /// Rank used by the query order; numeric kinds share a rank
    fn rank(&self) -> u8 {
        match self {
            DatumKind::Null => 0,
            DatumKind::Bool => 1,
            DatumKind::Int | DatumKind::Float => 2,
            DatumKind::Stamp => 3,
            DatumKind::Text => 4,
            DatumKind::Blob => 5,
            DatumKind::Ref => 6,
            DatumKind::List => 7,
        }
    }
}

impl fmt::Display for DatumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A storage-native scalar value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    /// Explicit null (present but empty; distinct from "no attribute")
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit IEEE float
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Opaque bytes
    Blob(Vec<u8>),
    /// UTC timestamp
    Stamp(DateTime<Utc>),
    /// Reference to another record's key
    Ref(Key),
    /// Multi-valued attribute
    List(Vec<Datum>),
}

impl Datum {
    /// The variant tag
    pub fn kind(&self) -> DatumKind {
        match self {
            Datum::Null => DatumKind::Null,
            Datum::Bool(_) => DatumKind::Bool,
            Datum::Int(_) => DatumKind::Int,
            Datum::Float(_) => DatumKind::Float,
            Datum::Text(_) => DatumKind::Text,
            Datum::Blob(_) => DatumKind::Blob,
            Datum::Stamp(_) => DatumKind::Stamp,
            Datum::Ref(_) => DatumKind::Ref,
            Datum::List(_) => DatumKind::List,
        }
    }

    /// Build a list datum from anything convertible
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Datum>,
    {
        Datum::List(items.into_iter().map(Into::into).collect())
    }

    /// True for `Datum::Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Get as bool if this is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Datum::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Get as &str if this is Text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as bytes if this is a Blob
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Datum::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get as timestamp if this is a Stamp
    pub fn as_stamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Datum::Stamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Get as key if this is a Ref
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Datum::Ref(k) => Some(k),
            _ => None,
        }
    }

    /// Get as slice if this is a List
    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }

    /// Total order for filters and sorts
    ///
    /// Variants rank `null < bool < numeric < stamp < text < blob < ref <
    /// list`; ints and floats compare numerically (an int ties before an
    /// equal float for determinism) and `NaN` sorts after every other
    /// number. Lists compare elementwise, then by length.
    pub fn query_cmp(&self, other: &Datum) -> Ordering {
        let rank = self.kind().rank().cmp(&other.kind().rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::Float(a), Datum::Float(b)) => a.total_cmp(b),
            (Datum::Int(a), Datum::Float(b)) => cmp_int_float(*a, *b),
            (Datum::Float(a), Datum::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Datum::Stamp(a), Datum::Stamp(b)) => a.cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            (Datum::Blob(a), Datum::Blob(b)) => a.cmp(b),
            (Datum::Ref(a), Datum::Ref(b)) => a.cmp(b),
            (Datum::List(a), Datum::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let step = x.query_cmp(y);
                    if step != Ordering::Equal {
                        return step;
                    }
                }
                a.len().cmp(&b.len())
            }
            // Same rank always means one of the arms above
            _ => Ordering::Equal,
        }
    }

    /// Render to a `serde_json::Value` (export/debug surface)
    ///
    /// Blobs render as hex text, stamps as RFC 3339, refs as the key's
    /// chain form. Non-finite floats render as text since JSON numbers
    /// cannot carry them.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(b) => Value::Bool(*b),
            Datum::Int(i) => Value::from(*i),
            Datum::Float(x) => match serde_json::Number::from_f64(*x) {
                Some(n) => Value::Number(n),
                None => Value::String(x.to_string()),
            },
            Datum::Text(s) => Value::String(s.clone()),
            Datum::Blob(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    hex.push_str(&format!("{:02x}", b));
                }
                Value::String(hex)
            }
            Datum::Stamp(t) => Value::String(t.to_rfc3339()),
            Datum::Ref(k) => Value::String(k.to_string()),
            Datum::List(items) => Value::Array(items.iter().map(Datum::to_json).collect()),
        }
    }

    /// Build from a `serde_json::Value`
    ///
    /// Integral numbers become ints, other numbers floats, strings text.
    /// Arrays become lists of scalars; nested arrays and objects have no
    /// datum shape and fail.
    pub fn from_json(value: &serde_json::Value) -> Result<Datum, DatumJsonError> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(Datum::Null),
            Value::Bool(b) => Ok(Datum::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Datum::Int(i))
                } else if let Some(x) = n.as_f64() {
                    Ok(Datum::Float(x))
                } else {
                    Err(DatumJsonError::UnrepresentableNumber(n.to_string()))
                }
            }
            Value::String(s) => Ok(Datum::Text(s.clone())),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    let datum = Datum::from_json(item)?;
                    if matches!(datum, Datum::List(_)) {
                        return Err(DatumJsonError::NestedArray);
                    }
                    list.push(datum);
                }
                Ok(Datum::List(list))
            }
            Value::Object(_) => Err(DatumJsonError::Object),
        }
    }
}

fn cmp_int_float(a: i64, b: f64) -> Ordering {
    if b.is_nan() {
        // NaN sorts after every number
        return Ordering::Less;
    }
    match (a as f64).partial_cmp(&b) {
        Some(Ordering::Equal) | None => Ordering::Less, // int ties before float
        Some(order) => order,
    }
}

// Strict per-variant equality: an int never equals a float, and float
// equality is IEEE, so `NaN != NaN`.
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a == b,
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Blob(a), Datum::Blob(b)) => a == b,
            (Datum::Stamp(a), Datum::Stamp(b)) => a == b,
            (Datum::Ref(a), Datum::Ref(b)) => a == b,
            (Datum::List(a), Datum::List(b)) => a == b,
            _ => false,
        }
    }
}

/// Failures turning JSON into datums
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatumJsonError {
    /// Arrays can hold only scalars
    #[error("nested arrays have no datum shape")]
    NestedArray,
    /// Objects have no datum shape
    #[error("JSON objects have no datum shape")]
    Object,
    /// Number outside i64/f64 range
    #[error("number {0} has no datum representation")]
    UnrepresentableNumber(String),
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Self {
        Datum::Int(i64::from(i))
    }
}

impl From<u32> for Datum {
    fn from(i: u32) -> Self {
        Datum::Int(i64::from(i))
    }
}

impl From<f64> for Datum {
    fn from(x: f64) -> Self {
        Datum::Float(x)
    }
}

impl From<f32> for Datum {
    fn from(x: f32) -> Self {
        Datum::Float(f64::from(x))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(bytes: Vec<u8>) -> Self {
        Datum::Blob(bytes)
    }
}

impl From<DateTime<Utc>> for Datum {
    fn from(t: DateTime<Utc>) -> Self {
        Datum::Stamp(t)
    }
}

impl From<Key> for Datum {
    fn from(k: Key) -> Self {
        Datum::Ref(k)
    }
}

impl From<crate::key::IdValue> for Datum {
    fn from(id: crate::key::IdValue) -> Self {
        match id {
            crate::key::IdValue::Int(i) => Datum::Int(i),
            crate::key::IdValue::Text(s) => Datum::Text(s),
        }
    }
}
