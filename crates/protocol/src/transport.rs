//! The peer transport seam.
//!
//! The coordinator fans out to peers through this trait rather than through a
//! concrete HTTP client, which is what lets the protocol tests run a full
//! multi-node exchange in memory. The production implementation is
//! [`crate::client::HttpPeerTransport`].

use async_trait::async_trait;
use attestor_types::config::PeerConfig;
use attestor_types::error::OracleError;
use attestor_types::model::ValidateRequest;
use attestor_types::value::Value;

/// A verified preparation received from one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContribution {
    /// The decoded prepared payload.
    pub prepared: Value,
    /// The canonical encoding the peer signed.
    pub encoded: Vec<u8>,
    /// The peer's compact signature over `encoded`.
    pub signature: Vec<u8>,
}

/// Client-side view of the peer RPC surface.
///
/// Implementations must verify the peer's prepare signature against the
/// peer's configured public key before returning a contribution; the
/// coordinator treats anything returned here as authenticated.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Runs `POST /task/prepare` against a peer.
    async fn prepare(
        &self,
        peer: &PeerConfig,
        plugin_id: &str,
        input: &Value,
    ) -> Result<PreparedContribution, OracleError>;

    /// Runs `POST /task/validate` against a peer, returning the updated
    /// aggregated artifact.
    async fn validate(
        &self,
        peer: &PeerConfig,
        request: &ValidateRequest,
    ) -> Result<Value, OracleError>;
}
