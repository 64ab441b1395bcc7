#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

//! # Attestor Listeners
//!
//! The scheduled listener runtime: a per-listener fiber scheduler, the EVM
//! log listener, the Solana signature listener, and the thin JSON-RPC source
//! adapters behind them. Listeners observe a source chain, turn events into
//! task inputs, and dispatch them through the plugin registry by id.

/// The EVM log listener.
pub mod evm;
/// The per-listener fiber scheduler.
pub mod scheduler;
/// The Solana signature listener.
pub mod solana;
/// JSON-RPC source adapters and provider URL construction.
pub mod sources;

use async_trait::async_trait;
use attestor_types::error::OracleError;

/// The one downstream query a listener needs at cold start: how far the
/// abstraction chain has already indexed a source. Kept as a seam so listener
/// tests run without a chain.
#[async_trait]
pub trait ChainIndex: Send + Sync {
    /// The height `source` is indexed up to, if known.
    async fn indexed_height(&self, source: &str) -> Result<Option<u64>, OracleError>;
}

#[async_trait]
impl ChainIndex for attestor_protocol::chain::ChainClient {
    async fn indexed_height(&self, source: &str) -> Result<Option<u64>, OracleError> {
        attestor_protocol::chain::ChainClient::indexed_height(self, source).await
    }
}
