//! The HTTP peer transport.
//!
//! Peer request bodies are the canonical codec encoding, sent with a
//! `application/json` content type. The label is wrong, but it is what every
//! deployed node expects; both ends must keep emitting it and must ignore it
//! when reading.

use crate::transport::{PeerTransport, PreparedContribution};
use async_trait::async_trait;
use attestor_types::codec;
use attestor_types::config::PeerConfig;
use attestor_types::error::OracleError;
use attestor_types::model::{
    ErrorBody, PrepareReply, PrepareRequest, ValidateReply, ValidateRequest,
};
use attestor_types::value::{ToValue, Value};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;

/// Peer RPC over HTTP.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    /// Builds a transport with a per-request timeout.
    ///
    /// Connection pooling is the HTTP library's concern; the protocol holds
    /// no long-lived state per peer.
    pub fn new(request_timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("build http client: {e}")))?;
        Ok(Self { client })
    }

    async fn post_codec(
        &self,
        peer: &PeerConfig,
        route: &str,
        body: Vec<u8>,
    ) -> Result<(StatusCode, Vec<u8>), OracleError> {
        let url = format!("http://{}{route}", peer.address);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(format!("post {url}: {e}")))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transport(format!("read {url}: {e}")))?;
        attestor_telemetry::metrics::inc_peer_rpc(route, status.as_u16());
        Ok((status, bytes.to_vec()))
    }
}

fn peer_error(peer: &PeerConfig, route: &str, status: StatusCode, body: &[u8]) -> OracleError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .map(|e| match e.context {
            Some(context) => format!("{} ({context})", e.error),
            None => e.error,
        })
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    match status {
        StatusCode::NOT_FOUND => OracleError::NotFound(format!("peer {}: {detail}", peer.id)),
        StatusCode::BAD_REQUEST => {
            OracleError::Validation(format!("peer {} {route}: {detail}", peer.id))
        }
        _ => OracleError::Transport(format!("peer {} {route}: {status}: {detail}", peer.id)),
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn prepare(
        &self,
        peer: &PeerConfig,
        plugin_id: &str,
        input: &Value,
    ) -> Result<PreparedContribution, OracleError> {
        let request = PrepareRequest {
            plugin_id: plugin_id.to_string(),
            input: input.clone(),
        };
        let body = codec::encode(&request.to_value());
        let (status, bytes) = self.post_codec(peer, "/task/prepare", body).await?;
        if status != StatusCode::OK {
            return Err(peer_error(peer, "/task/prepare", status, &bytes));
        }
        let reply: PrepareReply = serde_json::from_slice(&bytes)
            .map_err(|e| OracleError::Transport(format!("peer {} prepare reply: {e}", peer.id)))?;
        let encoded = hex::decode(&reply.encoded_data).map_err(|e| {
            OracleError::Transport(format!("peer {} encodedData hex: {e}", peer.id))
        })?;
        let signature = hex::decode(&reply.signature).map_err(|e| {
            OracleError::Transport(format!("peer {} signature hex: {e}", peer.id))
        })?;

        // The contribution is only usable if the peer really signed the
        // encoding it returned.
        let public = attestor_crypto::public_key_from_hex(&peer.public_key)?;
        if !attestor_crypto::verify(&encoded, &signature, &public) {
            return Err(OracleError::Validation(format!(
                "peer {} prepare signature does not verify",
                peer.id
            )));
        }
        let prepared = codec::decode(&encoded)?;
        Ok(PreparedContribution {
            prepared,
            encoded,
            signature,
        })
    }

    async fn validate(
        &self,
        peer: &PeerConfig,
        request: &ValidateRequest,
    ) -> Result<Value, OracleError> {
        let body = codec::encode(&request.to_value());
        let (status, bytes) = self.post_codec(peer, "/task/validate", body).await?;
        if status != StatusCode::OK {
            return Err(peer_error(peer, "/task/validate", status, &bytes));
        }
        let reply: ValidateReply = serde_json::from_slice(&bytes).map_err(|e| {
            OracleError::Transport(format!("peer {} validate reply: {e}", peer.id))
        })?;
        let encoded = hex::decode(&reply.encoded_data).map_err(|e| {
            OracleError::Transport(format!("peer {} encodedData hex: {e}", peer.id))
        })?;
        Ok(codec::decode(&encoded)?)
    }
}
