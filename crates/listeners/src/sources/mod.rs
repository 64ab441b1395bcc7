//! Thin JSON-RPC adapters over the configured provider pools.

/// The EVM JSON-RPC adapter.
pub mod evm;
/// Provider endpoint URL construction.
pub mod provider;
/// The Solana JSON-RPC adapter.
pub mod solana;
