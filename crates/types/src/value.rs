//! The structured value grammar shared by the codec, the peer wire, and the
//! plugin contract.
//!
//! Every payload the protocol signs is first expressed as a [`Value`] and then
//! canonicalized by the codec in [`crate::codec`]. The grammar deliberately
//! stays small: scalars, byte blobs, ordered arrays, and string-keyed maps.

use crate::error::CodecError;
use num_bigint::BigInt;
use std::cmp::Ordering;

/// A structured value in the canonical grammar.
///
/// Maps hold their entries as a plain `Vec` of pairs; [`Value::map`] sorts the
/// entries into canonical order on construction, and the codec re-sorts at
/// encode time, so two logically equal maps encode identically regardless of
/// how they were built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// The absent value.
    Null,
    /// A UTF-8 string.
    Text(String),
    /// A signed 64-bit integer.
    Number(i64),
    /// A boolean.
    Bool(bool),
    /// An arbitrary-precision integer.
    BigInt(BigInt),
    /// An opaque byte blob.
    Bytes(Vec<u8>),
    /// A millisecond unix timestamp.
    Timestamp(u64),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A string-keyed map, canonically ordered by [`natural_cmp`].
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Builds a map value in canonical key order.
    ///
    /// Duplicate keys keep the last occurrence.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut entries: Vec<(String, Value)> =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        entries.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        entries.dedup_by(|next, prev| {
            if next.0 == prev.0 {
                std::mem::swap(&mut prev.1, &mut next.1);
                true
            } else {
                false
            }
        });
        Value::Map(entries)
    }

    /// Looks up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns the string contents of a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a numeric value widened to `u64` when non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(n) if *n >= 0 => Some(*n as u64),
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the raw bytes of a blob value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Converts a JSON document into the canonical grammar.
    ///
    /// Integral numbers become [`Value::Number`] when they fit in `i64` and
    /// [`Value::BigInt`] otherwise. Fractional numbers are rejected: they have
    /// no canonical decimal form that is stable enough to sign over.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CodecError> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(i)
                } else if let Some(u) = n.as_u64() {
                    Value::BigInt(BigInt::from(u))
                } else {
                    return Err(CodecError::FractionalNumber(n.to_string()));
                }
            }
            serde_json::Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(obj) => Value::map(
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), Value::from_json(v)?)))
                    .collect::<Result<Vec<_>, CodecError>>()?,
            ),
        })
    }

    /// Renders the value as JSON for external API responses and logs.
    ///
    /// Big integers render as decimal strings and byte blobs as `0x`-prefixed
    /// hex, so this direction is not the canonical form and is never signed.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Value::from(*n),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::BigInt(i) => serde_json::Value::String(i.to_string()),
            Value::Bytes(b) => serde_json::Value::String(format!("0x{}", hex::encode(b))),
            Value::Timestamp(t) => serde_json::Value::from(*t),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Converts a domain type into the canonical value grammar.
pub trait ToValue {
    /// Returns the value representation of `self`.
    fn to_value(&self) -> Value;
}

/// Reconstructs a domain type from the canonical value grammar.
pub trait FromValue: Sized {
    /// Parses `value` back into the domain type.
    fn from_value(value: Value) -> Result<Self, CodecError>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        Ok(value)
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(CodecError::UnexpectedShape {
                expected: "string",
                found: kind_name(&other),
            }),
        }
    }
}

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::Number(*self)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(CodecError::UnexpectedShape {
                expected: "number",
                found: kind_name(&other),
            }),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(CodecError::UnexpectedShape {
                expected: "boolean",
                found: kind_name(&other),
            }),
        }
    }
}

// The unit type is the empty plugin output used for vacuous successes.
impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(()),
            other => Err(CodecError::UnexpectedShape {
                expected: "null",
                found: kind_name(&other),
            }),
        }
    }
}

/// Returns a short static name for a value's shape, used in decode errors.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Text(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::BigInt(_) => "big integer",
        Value::Bytes(_) => "bytes",
        Value::Timestamp(_) => "timestamp",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
    }
}

/// Compares two map keys with natural ordering.
///
/// Runs of ASCII digits are compared numerically and the surrounding
/// characters byte-lexicographically, so `"a2"` sorts before `"a10"`. When two
/// digit runs are numerically equal, the run with fewer leading zeros sorts
/// first; this keeps the ordering total. This comparison is the map
/// canonicalization used for signing and must not change.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    let mut i = 0;
    let mut j = 0;
    while i < ab.len() && j < bb.len() {
        let ca = ab[i];
        let cb = bb[j];
        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let si = i;
            while i < ab.len() && ab[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < bb.len() && bb[j].is_ascii_digit() {
                j += 1;
            }
            let ra = trim_leading_zeros(&ab[si..i]);
            let rb = trim_leading_zeros(&bb[sj..j]);
            let numeric = ra.len().cmp(&rb.len()).then_with(|| ra.cmp(rb));
            if numeric != Ordering::Equal {
                return numeric;
            }
            let by_width = (i - si).cmp(&(j - sj));
            if by_width != Ordering::Equal {
                return by_width;
            }
        } else {
            let by_byte = ca.cmp(&cb);
            if by_byte != Ordering::Equal {
                return by_byte;
            }
            i += 1;
            j += 1;
        }
    }
    (ab.len() - i).cmp(&(bb.len() - j))
}

fn trim_leading_zeros(digits: &[u8]) -> &[u8] {
    let mut start = 0;
    while start + 1 < digits.len() && digits[start] == b'0' {
        start += 1;
    }
    &digits[start..]
}
