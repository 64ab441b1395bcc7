//! Source-chain adapter interfaces.
//!
//! These traits abstract the handful of queries a concrete listener needs
//! from its source chain. The implementations are thin JSON-RPC shims and
//! live with the listeners; everything behind these seams is an external
//! collaborator.

use async_trait::async_trait;
use attestor_types::error::OracleError;
use attestor_types::value::Value;

/// One EVM log event inside a scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmLog {
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Position of the log within the block.
    pub log_index: u64,
    /// Hash of the emitting transaction.
    pub tx_hash: String,
    /// Emitting contract address.
    pub address: String,
    /// Raw log topics.
    pub topics: Vec<String>,
    /// ABI-encoded log data, hex.
    pub data: String,
}

impl EvmLog {
    /// The stable deduplication id: `txHash-logIndex`.
    pub fn event_id(&self) -> String {
        format!("{}-{}", self.tx_hash, self.log_index)
    }

    /// The canonical value handed to plugins as part of a task input.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("blockNumber", Value::Number(self.block_number as i64)),
            ("logIndex", Value::Number(self.log_index as i64)),
            ("txHash", Value::Text(self.tx_hash.clone())),
            ("address", Value::Text(self.address.clone())),
            (
                "topics",
                Value::Array(self.topics.iter().cloned().map(Value::Text).collect()),
            ),
            ("data", Value::Text(self.data.clone())),
        ])
    }
}

/// Queries an EVM-family source chain.
#[async_trait]
pub trait EvmSource: Send + Sync {
    /// The current head block number.
    async fn head_number(&self) -> Result<u64, OracleError>;

    /// All logs emitted by `addresses` in the inclusive range `[from, to]`.
    async fn logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<EvmLog>, OracleError>;
}

/// One confirmed Solana transaction signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaSignature {
    /// The transaction signature (the event id on Solana).
    pub signature: String,
    /// The slot the transaction landed in.
    pub slot: u64,
}

/// Queries a Solana source chain.
#[async_trait]
pub trait SolanaSource: Send + Sync {
    /// The current confirmed slot.
    async fn head_slot(&self) -> Result<u64, OracleError>;

    /// Signatures touching `program` at slots strictly greater than
    /// `min_slot`, oldest first.
    async fn signatures_since(
        &self,
        program: &str,
        min_slot: u64,
    ) -> Result<Vec<SolanaSignature>, OracleError>;
}
