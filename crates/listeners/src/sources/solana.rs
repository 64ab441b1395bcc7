//! JSON-RPC adapter for Solana sources.

use crate::sources::provider::endpoint_urls;
use async_trait::async_trait;
use attestor_api::source::{SolanaSignature, SolanaSource};
use attestor_types::config::RpcProviderConfig;
use attestor_types::error::OracleError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Provider-side page limit for signature queries.
const SIGNATURE_PAGE_LIMIT: u32 = 1000;

/// A Solana source backed by a failover pool of JSON-RPC endpoints.
pub struct HttpSolanaSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpSolanaSource {
    /// Builds the adapter from the configured provider entries.
    pub fn from_providers(providers: &[RpcProviderConfig]) -> Result<Self, OracleError> {
        let urls = endpoint_urls(providers)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OracleError::Transport(format!("build http client: {e}")))?;
        Ok(Self { client, urls })
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, OracleError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let mut last_err = None;
        for url in &self.urls {
            let response = match self.client.post(url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(OracleError::Transport(format!("post {url}: {e}")));
                    continue;
                }
            };
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(OracleError::Throttle(format!("{url}: 429 from provider")));
            }
            if !response.status().is_success() {
                last_err = Some(OracleError::Transport(format!(
                    "post {url}: {}",
                    response.status()
                )));
                continue;
            }
            let reply: serde_json::Value = response
                .json()
                .await
                .map_err(|e| OracleError::Transport(format!("decode {url}: {e}")))?;
            if let Some(err) = reply.get("error").filter(|e| !e.is_null()) {
                last_err = Some(OracleError::Transport(format!("{method} at {url}: {err}")));
                continue;
            }
            return Ok(reply.get("result").cloned().unwrap_or(serde_json::Value::Null));
        }
        Err(last_err.unwrap_or_else(|| OracleError::Transport("no rpc provider reachable".into())))
    }
}

#[derive(Debug, Deserialize)]
struct RawSignature {
    signature: String,
    slot: u64,
}

#[async_trait]
impl SolanaSource for HttpSolanaSource {
    async fn head_slot(&self) -> Result<u64, OracleError> {
        let result = self
            .rpc_call("getSlot", json!([{ "commitment": "confirmed" }]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| OracleError::Transport("getSlot: non-numeric reply".into()))
    }

    async fn signatures_since(
        &self,
        program: &str,
        min_slot: u64,
    ) -> Result<Vec<SolanaSignature>, OracleError> {
        let result = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([
                    program,
                    { "commitment": "confirmed", "limit": SIGNATURE_PAGE_LIMIT }
                ]),
            )
            .await?;
        let raw: Vec<RawSignature> = serde_json::from_value(result)
            .map_err(|e| OracleError::Transport(format!("getSignaturesForAddress: {e}")))?;
        // The provider answers newest-first; keep only what is past the
        // cursor and let the listener order the remainder.
        Ok(raw
            .into_iter()
            .filter(|sig| sig.slot > min_slot)
            .map(|sig| SolanaSignature {
                signature: sig.signature,
                slot: sig.slot,
            })
            .collect())
    }
}
