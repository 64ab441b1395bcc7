//! The downstream abstraction-chain client.
//!
//! The abstraction chain is an external collaborator with exactly the
//! operations the protocol needs: submit a signed transaction, check whether
//! an event id was already processed, and report the height it has indexed a
//! source up to. Directory nodes are tried in pool order; transient failures
//! are retried with the shared backoff policy.

use crate::retry::{retry, RetryPolicy};
use attestor_types::config::AbstractionChainConfig;
use attestor_types::error::OracleError;
use serde_json::json;
use std::time::Duration;

/// Terminal state of a transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The chain accepted the transaction.
    Accepted,
    /// The chain already holds an identical transaction.
    Duplicate,
}

/// HTTP client for the abstraction chain's directory nodes.
pub struct ChainClient {
    urls: Vec<String>,
    blockchain_rid: String,
    client: reqwest::Client,
}

impl ChainClient {
    /// Builds a client from the configured endpoint pool.
    pub fn new(config: &AbstractionChainConfig) -> Result<Self, OracleError> {
        if config.directory_node_url_pool.is_empty() {
            return Err(OracleError::Config(
                "abstractionChain.directoryNodeUrlPool is empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| OracleError::Transport(format!("build http client: {e}")))?;
        Ok(Self {
            urls: config.directory_node_url_pool.clone(),
            blockchain_rid: config.blockchain_rid.clone(),
            client,
        })
    }

    /// Submits a signed transaction.
    ///
    /// This is the one place the duplicate rule lives: a 409 from the chain
    /// means an identical transaction has already been accepted, and the
    /// caller's effect therefore already exists. Callers treat
    /// [`SubmitOutcome::Duplicate`] (or the equivalent
    /// [`OracleError::DuplicateSubmission`]) as success.
    pub async fn submit(&self, tx: &[u8]) -> Result<SubmitOutcome, OracleError> {
        let body = json!({ "tx": hex::encode(tx) });
        retry(RetryPolicy::submission_backoff(), is_transient, || async {
            let mut last_err = None;
            for base in &self.urls {
                let url = format!("{base}/tx/{}", self.blockchain_rid);
                let response = match self.client.post(&url).json(&body).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        last_err = Some(OracleError::Transport(format!("post {url}: {e}")));
                        continue;
                    }
                };
                match response.status() {
                    reqwest::StatusCode::OK => return Ok(SubmitOutcome::Accepted),
                    reqwest::StatusCode::CONFLICT => return Ok(SubmitOutcome::Duplicate),
                    status if status.is_server_error() => {
                        last_err =
                            Some(OracleError::Transport(format!("post {url}: {status}")));
                    }
                    status => {
                        let text = response.text().await.unwrap_or_default();
                        return Err(OracleError::Execute(format!(
                            "chain rejected transaction: {status}: {text}"
                        )));
                    }
                }
            }
            Err(last_err
                .unwrap_or_else(|| OracleError::Transport("no directory node reachable".into())))
        })
        .await
    }

    /// True when the chain's processed-event table already holds `event_id`.
    pub async fn already_processed(&self, event_id: &str) -> Result<bool, OracleError> {
        let reply = self
            .query("event_processed", json!({ "eventId": event_id }))
            .await?;
        reply
            .as_bool()
            .ok_or_else(|| OracleError::Transport("event_processed: non-boolean reply".into()))
    }

    /// The height the chain has indexed `source` up to, if it knows one.
    pub async fn indexed_height(&self, source: &str) -> Result<Option<u64>, OracleError> {
        let reply = self
            .query("indexed_block_height", json!({ "source": source }))
            .await?;
        if reply.is_null() {
            return Ok(None);
        }
        reply
            .as_u64()
            .map(Some)
            .ok_or_else(|| OracleError::Transport("indexed_block_height: non-numeric reply".into()))
    }

    async fn query(
        &self,
        query_type: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, OracleError> {
        let body = json!({ "type": query_type, "args": args });
        retry(RetryPolicy::submission_backoff(), is_transient, || async {
            let mut last_err = None;
            for base in &self.urls {
                let url = format!("{base}/query/{}", self.blockchain_rid);
                match self.client.post(&url).json(&body).send().await {
                    Ok(response) if response.status().is_success() => {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            OracleError::Transport(format!("decode {url}: {e}"))
                        });
                    }
                    Ok(response) => {
                        last_err = Some(OracleError::Transport(format!(
                            "post {url}: {}",
                            response.status()
                        )));
                    }
                    Err(e) => {
                        last_err = Some(OracleError::Transport(format!("post {url}: {e}")));
                    }
                }
            }
            Err(last_err
                .unwrap_or_else(|| OracleError::Transport("no directory node reachable".into())))
        })
        .await
    }
}

fn is_transient(err: &OracleError) -> bool {
    matches!(err, OracleError::Transport(_))
}
