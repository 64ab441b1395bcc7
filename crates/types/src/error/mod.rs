//! Core error types for the Attestor oracle network.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The codes are the wire-level error tags: they appear in HTTP error bodies,
/// structured logs, and metric labels, and must never change once shipped.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors produced by the canonical binary codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The type marker byte is not part of the grammar.
    #[error("unknown type marker: {0}")]
    UnknownMarker(u8),
    /// The buffer ended inside a value or a length frame.
    #[error("truncated encoding")]
    Truncated,
    /// Bytes remained after the value was fully decoded.
    #[error("trailing bytes after value")]
    TrailingBytes,
    /// A text payload was not valid UTF-8.
    #[error("invalid utf-8 in text payload")]
    InvalidUtf8,
    /// A numeric payload was not valid decimal text.
    #[error("invalid decimal payload: {0}")]
    InvalidNumber(String),
    /// A boolean payload was neither '1' nor '0'.
    #[error("invalid boolean payload")]
    InvalidBool,
    /// A JSON number carried a fractional part and cannot be canonicalized.
    #[error("fractional numbers are not canonicalizable: {0}")]
    FractionalNumber(String),
    /// A value had the wrong shape for the requested conversion.
    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        /// The shape the caller required.
        expected: &'static str,
        /// The shape actually present.
        found: &'static str,
    },
    /// A required map field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// The tagged error taxonomy used at every protocol boundary.
///
/// Every phase of a task, every RPC surface, and every listener reports
/// through this enum. Only two variants ever convert to success, and only in
/// the task coordinator: `Permanent` at the prepare phase and
/// `DuplicateSubmission` at the execute phase. `NonError` reports success
/// wherever a plugin returns it.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Arbitrary plugin-internal failure.
    #[error("plugin error: {0}")]
    Plugin(String),
    /// The plugin's prepare phase failed.
    #[error("prepare failed: {0}")]
    Prepare(String),
    /// The plugin's process phase failed.
    #[error("process failed: {0}")]
    Process(String),
    /// The plugin's validate phase failed, or a signature check failed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The plugin's execute phase failed.
    #[error("execute failed: {0}")]
    Execute(String),
    /// The input is structurally un-processable; peers would reject it too.
    #[error("permanent error: {0}")]
    Permanent(String),
    /// Nothing to do; the effect already exists upstream.
    #[error("nothing to do: {0}")]
    NonError(String),
    /// A deadline elapsed: the prepare fan-out or an external RPC budget.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Too few peer preparations were collected to meet quorum.
    #[error("insufficient peers: collected {collected}, required {required}")]
    InsufficientPeers {
        /// Distinct preparations collected, self included.
        collected: usize,
        /// The configured quorum threshold.
        required: u32,
    },
    /// The rate limiter surfaced an underlying failure.
    #[error("throttled call failed: {0}")]
    Throttle(String),
    /// No listener dispatch mapping exists for this contract type.
    #[error("unsupported contract type: {0}")]
    UnsupportedContractType(String),
    /// A registry or route lookup missed.
    #[error("not found: {0}")]
    NotFound(String),
    /// Canonical encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A key parse, hash, or signature operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// The static configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
    /// An HTTP transport failure talking to a peer or a source chain.
    #[error("transport error: {0}")]
    Transport(String),
    /// The downstream chain already holds this submission.
    #[error("duplicate submission")]
    DuplicateSubmission,
}

impl ErrorCode for OracleError {
    fn code(&self) -> &'static str {
        match self {
            Self::Plugin(_) => "plugin_error",
            Self::Prepare(_) => "prepare_error",
            Self::Process(_) => "process_error",
            Self::Validation(_) => "validation_error",
            Self::Execute(_) => "execute_error",
            Self::Permanent(_) => "permanent_error",
            Self::NonError(_) => "non_error",
            Self::Timeout(_) => "timeout",
            Self::InsufficientPeers { .. } => "insufficient_peers",
            Self::Throttle(_) => "throttle_error",
            Self::UnsupportedContractType(_) => "unsupported_contract_type",
            Self::NotFound(_) => "not_found",
            Self::Codec(_) => "codec_error",
            Self::Crypto(_) => "crypto_error",
            Self::Config(_) => "config_error",
            Self::Transport(_) => "transport_error",
            Self::DuplicateSubmission => "duplicate_submission",
        }
    }
}

impl OracleError {
    /// Returns the human-oriented context string carried by the variant.
    pub fn context(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_tags() {
        assert_eq!(OracleError::Permanent("x".into()).code(), "permanent_error");
        assert_eq!(OracleError::NonError("x".into()).code(), "non_error");
        assert_eq!(
            OracleError::InsufficientPeers {
                collected: 1,
                required: 3
            }
            .code(),
            "insufficient_peers"
        );
        assert_eq!(
            OracleError::Codec(CodecError::Truncated).code(),
            "codec_error"
        );
    }
}
