//! The canonical, deterministic binary codec.
//!
//! Every value is emitted as a single-byte type marker followed by its
//! payload. Containers frame each child with an unsigned 32-bit big-endian
//! length of the child's full encoding, and map keys are emitted as encoded
//! strings sorted by [`natural_cmp`]. The encoding of a value is unique, which
//! is what makes signatures interoperate across nodes: all protocol
//! signatures are computed over `encode(payload)`, never over ad-hoc JSON.
//!
//! Decoding fails fast on unknown markers, truncated frames, and trailing
//! bytes; malformed data must never reach plugin code half-parsed.

use crate::error::CodecError;
use crate::value::{natural_cmp, Value};
use num_bigint::BigInt;
use std::str::FromStr;

const MARKER_NULL: u8 = 0;
const MARKER_TEXT: u8 = 1;
const MARKER_NUMBER: u8 = 2;
const MARKER_BOOL: u8 = 3;
const MARKER_BIGINT: u8 = 4;
const MARKER_BYTES: u8 = 5;
const MARKER_TIMESTAMP: u8 = 6;
const MARKER_ARRAY: u8 = 7;
const MARKER_MAP: u8 = 8;

/// Encodes a value into its canonical byte representation.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(MARKER_NULL),
        Value::Text(s) => {
            out.push(MARKER_TEXT);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Number(n) => {
            out.push(MARKER_NUMBER);
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::Bool(b) => {
            out.push(MARKER_BOOL);
            out.push(if *b { b'1' } else { b'0' });
        }
        Value::BigInt(i) => {
            out.push(MARKER_BIGINT);
            out.extend_from_slice(i.to_string().as_bytes());
        }
        Value::Bytes(b) => {
            out.push(MARKER_BYTES);
            out.extend_from_slice(b);
        }
        Value::Timestamp(t) => {
            out.push(MARKER_TIMESTAMP);
            out.extend_from_slice(t.to_string().as_bytes());
        }
        Value::Array(items) => {
            out.push(MARKER_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                let child = encode(item);
                out.extend_from_slice(&(child.len() as u32).to_be_bytes());
                out.extend_from_slice(&child);
            }
        }
        Value::Map(entries) => {
            // Re-sort defensively: the encoding must be canonical even for a
            // Map built without going through `Value::map`.
            let mut sorted: Vec<&(String, Value)> = entries.iter().collect();
            sorted.sort_by(|a, b| natural_cmp(&a.0, &b.0));
            out.push(MARKER_MAP);
            out.extend_from_slice(&(sorted.len() as u32).to_be_bytes());
            for (key, val) in sorted {
                let key_enc = encode(&Value::Text(key.clone()));
                out.extend_from_slice(&(key_enc.len() as u32).to_be_bytes());
                out.extend_from_slice(&key_enc);
                let val_enc = encode(val);
                out.extend_from_slice(&(val_enc.len() as u32).to_be_bytes());
                out.extend_from_slice(&val_enc);
            }
        }
    }
}

/// Decodes a canonical byte string back into a value.
///
/// The buffer must contain exactly one encoded value; trailing bytes are an
/// error.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let (marker, payload) = bytes.split_first().ok_or(CodecError::Truncated)?;
    match *marker {
        MARKER_NULL => {
            if payload.is_empty() {
                Ok(Value::Null)
            } else {
                Err(CodecError::TrailingBytes)
            }
        }
        MARKER_TEXT => Ok(Value::Text(
            std::str::from_utf8(payload)
                .map_err(|_| CodecError::InvalidUtf8)?
                .to_string(),
        )),
        MARKER_NUMBER => {
            let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
            text.parse::<i64>()
                .map(Value::Number)
                .map_err(|_| CodecError::InvalidNumber(text.to_string()))
        }
        MARKER_BOOL => match payload {
            [b'1'] => Ok(Value::Bool(true)),
            [b'0'] => Ok(Value::Bool(false)),
            _ => Err(CodecError::InvalidBool),
        },
        MARKER_BIGINT => {
            let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
            BigInt::from_str(text)
                .map(Value::BigInt)
                .map_err(|_| CodecError::InvalidNumber(text.to_string()))
        }
        MARKER_BYTES => Ok(Value::Bytes(payload.to_vec())),
        MARKER_TIMESTAMP => {
            let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
            text.parse::<u64>()
                .map(Value::Timestamp)
                .map_err(|_| CodecError::InvalidNumber(text.to_string()))
        }
        MARKER_ARRAY => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()?;
            let mut items = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let child = cursor.read_frame()?;
                items.push(decode(child)?);
            }
            cursor.finish()?;
            Ok(Value::Array(items))
        }
        MARKER_MAP => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()?;
            let mut entries = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let key = match decode(cursor.read_frame()?)? {
                    Value::Text(k) => k,
                    other => {
                        return Err(CodecError::UnexpectedShape {
                            expected: "string key",
                            found: crate::value::kind_name(&other),
                        })
                    }
                };
                let value = decode(cursor.read_frame()?)?;
                entries.push((key, value));
            }
            cursor.finish()?;
            Ok(Value::Map(entries))
        }
        other => Err(CodecError::UnknownMarker(other)),
    }
}

/// A bounds-checked reader over a container payload.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let end = self.pos.checked_add(4).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        let mut be = [0u8; 4];
        be.copy_from_slice(slice);
        self.pos = end;
        Ok(u32::from_be_bytes(be))
    }

    fn read_frame(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u32()? as usize;
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn finish(&self) -> Result<(), CodecError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }
}
