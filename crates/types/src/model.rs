//! Wire-level and protocol-level data structures.
//!
//! Peer request bodies travel as canonical codec encodings; peer responses
//! are JSON with hex-encoded fields. Both shapes live here so the client and
//! server sides cannot drift apart.

use crate::error::CodecError;
use crate::value::{FromValue, ToValue, Value};
use serde::{Deserialize, Serialize};

/// Sentinel stored in the primary's own prepare record instead of a real
/// encoding; the primary never posts a prepare to itself.
pub const PRIMARY_ENCODED_MARKER: &str = "<PRIMARY>";

/// One collected preparation, keyed by the contributing node's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPrepareRecord {
    /// Hex of the contributor's compressed public key.
    pub peer_public_key: String,
    /// The decoded prepared payload.
    pub prepared: Value,
    /// Hex of the canonical encoding the contributor signed, or
    /// [`PRIMARY_ENCODED_MARKER`] for the local record.
    pub encoded_data_hex: String,
    /// Hex of the contributor's signature over the encoding; `None` for the
    /// local record.
    pub signature_hex: Option<String>,
}

impl PeerPrepareRecord {
    /// Builds the local (primary) record, which carries no signature.
    pub fn local(public_key_hex: String, prepared: Value) -> Self {
        Self {
            peer_public_key: public_key_hex,
            prepared,
            encoded_data_hex: PRIMARY_ENCODED_MARKER.to_string(),
            signature_hex: None,
        }
    }
}

/// Body of `POST /task/prepare`, codec-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    /// Target plugin id.
    pub plugin_id: String,
    /// The task input, in the canonical grammar.
    pub input: Value,
}

impl ToValue for PrepareRequest {
    fn to_value(&self) -> Value {
        Value::map([
            ("pluginId", Value::Text(self.plugin_id.clone())),
            ("input", self.input.clone()),
        ])
    }
}

impl FromValue for PrepareRequest {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        Ok(Self {
            plugin_id: text_field(&value, "pluginId")?,
            input: value
                .get("input")
                .cloned()
                .ok_or(CodecError::MissingField("input"))?,
        })
    }
}

/// Body of `POST /task/validate`, codec-encoded on the wire.
///
/// `input` carries the current aggregated artifact; `prepared_data` is the
/// receiving peer's own preparation as collected during the prepare phase;
/// `signature` is the primary's signature over `encode(prepared_data)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateRequest {
    /// Target plugin id.
    pub plugin_id: String,
    /// The aggregated artifact as of the previous validation step.
    pub input: Value,
    /// The receiving peer's prepared payload.
    pub prepared_data: Value,
    /// Primary's signature over the canonical encoding of `prepared_data`.
    pub signature: Vec<u8>,
}

impl ToValue for ValidateRequest {
    fn to_value(&self) -> Value {
        Value::map([
            ("pluginId", Value::Text(self.plugin_id.clone())),
            ("input", self.input.clone()),
            ("preparedData", self.prepared_data.clone()),
            ("signature", Value::Bytes(self.signature.clone())),
        ])
    }
}

impl FromValue for ValidateRequest {
    fn from_value(value: Value) -> Result<Self, CodecError> {
        let signature = match value.get("signature") {
            Some(Value::Bytes(b)) => b.clone(),
            Some(other) => {
                return Err(CodecError::UnexpectedShape {
                    expected: "bytes",
                    found: crate::value::kind_name(other),
                })
            }
            None => return Err(CodecError::MissingField("signature")),
        };
        Ok(Self {
            plugin_id: text_field(&value, "pluginId")?,
            input: value
                .get("input")
                .cloned()
                .ok_or(CodecError::MissingField("input"))?,
            prepared_data: value
                .get("preparedData")
                .cloned()
                .ok_or(CodecError::MissingField("preparedData"))?,
            signature,
        })
    }
}

/// JSON reply of `POST /task/prepare`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrepareReply {
    /// Hex of the canonical encoding of the peer's prepared payload.
    pub encoded_data: String,
    /// Hex of the peer's signature over that encoding.
    pub signature: String,
}

/// JSON reply of `POST /task/validate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReply {
    /// Hex of the canonical encoding of the updated aggregated artifact.
    pub encoded_data: String,
}

/// JSON error envelope used by every HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The stable error code.
    pub error: String,
    /// Optional human-oriented context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn text_field(value: &Value, field: &'static str) -> Result<String, CodecError> {
    match value.get(field) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(other) => Err(CodecError::UnexpectedShape {
            expected: "string",
            found: crate::value::kind_name(other),
        }),
        None => Err(CodecError::MissingField(field)),
    }
}
