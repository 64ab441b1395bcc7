//! Verification of end-user signed auth envelopes.
//!
//! Plugins that accept direct user submissions (account linking, megadata
//! updates) authenticate the caller with a signature over a short-lived
//! envelope. The envelope is canonicalized through the codec like every other
//! signed payload.

use crate::public_key_from_hex;
use attestor_types::error::OracleError;
use attestor_types::value::Value;

/// A signed end-user envelope: a message plus the signing timestamp.
#[derive(Debug, Clone)]
pub struct AuthEnvelope<'a> {
    /// The message the user signed.
    pub message: &'a str,
    /// Millisecond unix timestamp the signature was produced at.
    pub timestamp_ms: u64,
}

impl AuthEnvelope<'_> {
    /// The canonical bytes the signature covers.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        attestor_types::codec::encode(&Value::map([
            ("message", Value::Text(self.message.to_string())),
            ("timestamp", Value::Timestamp(self.timestamp_ms)),
        ]))
    }
}

/// Verifies an end-user envelope signature and its freshness window.
///
/// The envelope is rejected when it is older than `max_age_ms` or claims a
/// timestamp more than `max_age_ms` in the future (clock skew past that is
/// indistinguishable from a replay).
pub fn verify_auth(
    envelope: &AuthEnvelope<'_>,
    signature: &[u8],
    public_key_hex: &str,
    max_age_ms: u64,
    now_ms: u64,
) -> Result<(), OracleError> {
    let age = now_ms.abs_diff(envelope.timestamp_ms);
    if age > max_age_ms {
        return Err(OracleError::Validation(format!(
            "auth envelope outside freshness window: {age}ms old, max {max_age_ms}ms"
        )));
    }
    let public = public_key_from_hex(public_key_hex)?;
    if !crate::verify(&envelope.canonical_bytes(), signature, &public) {
        return Err(OracleError::Validation("auth signature mismatch".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKeys;

    #[test]
    fn fresh_envelope_verifies() {
        let keys = NodeKeys::generate();
        let envelope = AuthEnvelope {
            message: "link:0xabc",
            timestamp_ms: 1_000_000,
        };
        let signature = keys.sign(&envelope.canonical_bytes());
        verify_auth(
            &envelope,
            &signature,
            &keys.public_key_hex(),
            30_000,
            1_010_000,
        )
        .unwrap();
    }

    #[test]
    fn stale_envelope_is_rejected() {
        let keys = NodeKeys::generate();
        let envelope = AuthEnvelope {
            message: "link:0xabc",
            timestamp_ms: 1_000_000,
        };
        let signature = keys.sign(&envelope.canonical_bytes());
        let err = verify_auth(
            &envelope,
            &signature,
            &keys.public_key_hex(),
            30_000,
            1_031_000,
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::Validation(_)));
    }

    #[test]
    fn future_dated_envelope_is_rejected() {
        let keys = NodeKeys::generate();
        let envelope = AuthEnvelope {
            message: "link:0xabc",
            timestamp_ms: 2_000_000,
        };
        let signature = keys.sign(&envelope.canonical_bytes());
        assert!(verify_auth(
            &envelope,
            &signature,
            &keys.public_key_hex(),
            30_000,
            1_000_000
        )
        .is_err());
    }

    #[test]
    fn tampered_message_is_rejected() {
        let keys = NodeKeys::generate();
        let envelope = AuthEnvelope {
            message: "link:0xabc",
            timestamp_ms: 1_000_000,
        };
        let signature = keys.sign(&envelope.canonical_bytes());
        let forged = AuthEnvelope {
            message: "link:0xdef",
            timestamp_ms: 1_000_000,
        };
        assert!(verify_auth(
            &forged,
            &signature,
            &keys.public_key_hex(),
            30_000,
            1_000_500
        )
        .is_err());
    }
}
