//! Shared configuration structures for the Attestor node.
//!
//! Configuration is loaded once at startup, validated, and treated as
//! read-only for the process lifetime. Field names follow the on-disk
//! camelCase convention.

use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A statically configured peer node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// Logical peer name.
    pub id: String,
    /// Hex of the peer's 33-byte compressed secp256k1 public key.
    pub public_key: String,
    /// `host:port` of the peer's protocol endpoint.
    pub address: String,
}

/// The kind of source-chain RPC provider an entry describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RpcProviderKind {
    /// Alchemy hosted endpoint, keyed by `apiKey`.
    Alchemy,
    /// Infura hosted endpoint, keyed by `apiKey`.
    Infura,
    /// QuickNode hosted endpoint, keyed by `apiKey`.
    Quicknode,
    /// Ankr hosted endpoint, keyed by `apiKey`.
    Ankr,
    /// A raw JSON-RPC URL.
    Json,
}

/// One source-chain RPC provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcProviderConfig {
    /// Provider kind.
    #[serde(rename = "type")]
    pub kind: RpcProviderKind,
    /// Chain selector for hosted providers (e.g. `eth-mainnet`).
    #[serde(default)]
    pub chain: Option<String>,
    /// Provider API key for hosted providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Full endpoint URL for `json` providers.
    #[serde(default)]
    pub url: Option<String>,
}

/// Endpoint configuration for the downstream abstraction chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractionChainConfig {
    /// Directory node URLs tried in order when submitting or querying.
    pub directory_node_url_pool: Vec<String>,
    /// The target blockchain RID on the abstraction chain.
    pub blockchain_rid: String,
}

/// Per-listener tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerTuning {
    /// Maximum number of blocks scanned per invocation.
    #[serde(default = "default_block_height_increment")]
    pub block_height_increment: u64,
    /// Delay before the next run after a caught-up invocation.
    #[serde(default = "default_throttle_on_success_ms")]
    pub throttle_on_success_ms: u64,
    /// Maximum events accumulated into a single task input.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// TTL for the listener's cursor and dedup entries in the shared cache.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

fn default_block_height_increment() -> u64 {
    100
}
fn default_throttle_on_success_ms() -> u64 {
    15_000
}
fn default_batch_size() -> usize {
    10
}
fn default_cache_ttl_ms() -> u64 {
    300_000
}

impl Default for ListenerTuning {
    fn default() -> Self {
        Self {
            block_height_increment: default_block_height_increment(),
            throttle_on_success_ms: default_throttle_on_success_ms(),
            batch_size: default_batch_size(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

/// Freshness window for end-user signed auth envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Maximum accepted age of a signed envelope, in milliseconds.
    #[serde(default = "default_signature_max_age_ms")]
    pub signature_max_age_ms: u64,
}

fn default_signature_max_age_ms() -> u64 {
    30_000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signature_max_age_ms: default_signature_max_age_ms(),
        }
    }
}

/// Credentials for the Helius webhook integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeliusWebhookConfig {
    /// The shared secret expected in the `Authorization` header.
    pub api_key: String,
    /// The webhook registration id at the provider.
    #[serde(default)]
    pub webhook_id: Option<String>,
    /// The publicly reachable URL the provider posts to.
    #[serde(default)]
    pub url: Option<String>,
}

/// Third-party webhook credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhooksConfig {
    /// Helius token-balance webhook, if enabled.
    #[serde(default)]
    pub helius: Option<HeliusWebhookConfig>,
}

/// The full static configuration snapshot for one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Logical node name; used as a metric label.
    pub id: String,
    /// Hex of the node's 32-byte secp256k1 secret key.
    pub private_key: String,
    /// Hex of the node's 33-byte compressed secp256k1 public key.
    pub public_key: String,
    /// TCP port of the peer-protocol server.
    pub port: u16,
    /// TCP port of the external API server.
    pub api_port: u16,
    /// TCP port of the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Whether this node initiates tasks and runs listeners.
    #[serde(default)]
    pub primary: bool,
    /// Hex public key of the cluster's primary node. Secondaries verify
    /// `/task/validate` signatures under this key; the primary's own config
    /// may omit it.
    #[serde(default)]
    pub primary_public_key: Option<String>,
    /// The other nodes of the cluster. The local node is never listed here.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Prepare fan-out deadline in milliseconds.
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
    /// Quorum threshold, counting the local node.
    pub min_signatures_required: u32,
    /// Source-chain RPC providers, keyed by source name.
    #[serde(default)]
    pub rpc: HashMap<String, Vec<RpcProviderConfig>>,
    /// Per-source rate limits (calls per second); sources default to 10.
    #[serde(default)]
    pub rate_limits: HashMap<String, u32>,
    /// Downstream abstraction-chain endpoints.
    pub abstraction_chain: AbstractionChainConfig,
    /// Free-form per-plugin settings, handed to plugins by id.
    #[serde(default)]
    pub plugins: HashMap<String, serde_yaml::Value>,
    /// Per-listener tuning, keyed by listener id.
    #[serde(default)]
    pub listeners: HashMap<String, ListenerTuning>,
    /// End-user auth envelope settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Third-party webhook credentials.
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

fn default_peer_timeout_ms() -> u64 {
    30_000
}
fn default_metrics_port() -> u16 {
    9100
}

impl NodeConfig {
    /// Loads and validates a configuration file.
    ///
    /// YAML is the preferred format; a `.json` extension switches to the JSON
    /// parser. Anything else is parsed as YAML, which also accepts JSON
    /// documents.
    pub fn load(path: &Path) -> Result<Self, OracleError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| OracleError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&raw)
                .map_err(|e| OracleError::Config(format!("parse {}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| OracleError::Config(format!("parse {}: {e}", path.display())))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.min_signatures_required == 0 {
            return Err(OracleError::Config(
                "minSignaturesRequired must be at least 1".into(),
            ));
        }
        check_hex_key("privateKey", &self.private_key, 32)?;
        check_hex_key("publicKey", &self.public_key, 33)?;
        let mut seen = std::collections::HashSet::new();
        for peer in &self.peers {
            check_hex_key(&format!("peer {} publicKey", peer.id), &peer.public_key, 33)?;
            if peer.public_key.eq_ignore_ascii_case(&self.public_key) {
                return Err(OracleError::Config(format!(
                    "peer {} carries the local public key; a node is never its own peer",
                    peer.id
                )));
            }
            if !seen.insert(peer.public_key.to_ascii_lowercase()) {
                return Err(OracleError::Config(format!(
                    "duplicate peer public key on {}",
                    peer.id
                )));
            }
        }
        if !self.primary && self.primary_public_key.is_none() {
            return Err(OracleError::Config(
                "secondary nodes must set primaryPublicKey".into(),
            ));
        }
        if let Some(key) = &self.primary_public_key {
            check_hex_key("primaryPublicKey", key, 33)?;
        }
        Ok(())
    }

    /// The public key `/task/validate` signatures must verify under: the
    /// local key on the primary itself, the configured primary key elsewhere.
    pub fn effective_primary_public_key(&self) -> &str {
        match &self.primary_public_key {
            Some(key) => key,
            None => &self.public_key,
        }
    }

    /// Returns the rate limit for a source, in calls per second.
    pub fn rate_limit_for(&self, source: &str) -> u32 {
        self.rate_limits.get(source).copied().unwrap_or(10)
    }

    /// Returns the tuning block for a listener, falling back to defaults.
    pub fn listener_tuning(&self, listener_id: &str) -> ListenerTuning {
        self.listeners.get(listener_id).cloned().unwrap_or_default()
    }
}

fn check_hex_key(field: &str, value: &str, expected_len: usize) -> Result<(), OracleError> {
    let bytes = hex::decode(value)
        .map_err(|e| OracleError::Config(format!("{field} is not valid hex: {e}")))?;
    if bytes.len() != expected_len {
        return Err(OracleError::Config(format!(
            "{field} must be {expected_len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}
