//! JSON-RPC adapter for EVM-family sources.

use crate::sources::provider::endpoint_urls;
use async_trait::async_trait;
use attestor_api::source::{EvmLog, EvmSource};
use attestor_types::config::RpcProviderConfig;
use attestor_types::error::OracleError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// An EVM source backed by a failover pool of JSON-RPC endpoints.
pub struct HttpEvmSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpEvmSource {
    /// Builds the adapter from the configured provider entries.
    pub fn from_providers(providers: &[RpcProviderConfig]) -> Result<Self, OracleError> {
        let urls = endpoint_urls(providers)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OracleError::Transport(format!("build http client: {e}")))?;
        Ok(Self { client, urls })
    }

    /// One JSON-RPC call with provider failover.
    ///
    /// A 429 surfaces immediately as a throttle error so the caller's
    /// `retry_on_429` wrapper can penalize the key; other failures move on to
    /// the next provider in the pool.
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

/// Parses a `0x`-prefixed hex quantity.
fn parse_hex_u64(value: &str) -> Result<u64, OracleError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|_| OracleError::Transport(format!("bad hex quantity: {value}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    block_number: String,
    log_index: String,
    transaction_hash: String,
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

#[async_trait]
impl EvmSource for HttpEvmSource {
    async fn head_number(&self) -> Result<u64, OracleError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| OracleError::Transport("eth_blockNumber: non-string reply".into()))?;
        parse_hex_u64(hex)
    }

    async fn logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<EvmLog>, OracleError> {
        let filter = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": addresses,
        });
        let result = self.rpc_call("eth_getLogs", json!([filter])).await?;
        let raw: Vec<RawLog> = serde_json::from_value(result)
            .map_err(|e| OracleError::Transport(format!("eth_getLogs: {e}")))?;
        raw.into_iter()
            .map(|log| {
                Ok(EvmLog {
                    block_number: parse_hex_u64(&log.block_number)?,
                    log_index: parse_hex_u64(&log.log_index)?,
                    tx_hash: log.transaction_hash,
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x1234abc").unwrap(), 0x1234abc);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn raw_logs_deserialize_from_rpc_shape() {
        let raw: RawLog = serde_json::from_value(serde_json::json!({
            "blockNumber": "0x3e8",
            "logIndex": "0x2",
            "transactionHash": "0xfeed",
            "address": "0xc0ffee",
            "topics": ["0xaaaa"],
            "data": "0x00"
        }))
        .unwrap();
        assert_eq!(parse_hex_u64(&raw.block_number).unwrap(), 1000);
        assert_eq!(parse_hex_u64(&raw.log_index).unwrap(), 2);
    }
}
