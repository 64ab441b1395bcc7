#![forbid(unsafe_code)]

//! # Attestor Node
//!
//! Assembles a running node from a validated [`NodeConfig`]: key material,
//! the plugin registry, the shared cache and rate limiter, the peer and API
//! servers, the metrics server, and, on the primary, the listener
//! scheduler.
//!
//! Plugin bodies live outside this workspace. A deployment links them in by
//! building a [`NodeBuilder`], registering its plugins, attaching the
//! listeners that feed them, and calling [`NodeBuilder::run`]:
//!
//! ```ignore
//! let mut node = NodeBuilder::from_config_path(&path)?;
//! node.register_plugin(Arc::new(EvmForwarder::new(node.plugin_settings("evm_forwarder"))))?;
//! node.add_evm_listener("evm_events", "ethereum", "evm_forwarder", addresses)?;
//! node.run().await
//! ```

use anyhow::Context as _;
use attestor_api::cache::SharedCache;
use attestor_api::listener::Listener;
use attestor_api::plugin::ErasedPlugin;
use attestor_api::registry::PluginRegistry;
use attestor_crypto::NodeKeys;
use attestor_gateway::api::ApiState;
use attestor_gateway::peer::PeerState;
use attestor_listeners::evm::EvmListener;
use attestor_listeners::scheduler::Scheduler;
use attestor_listeners::solana::SolanaListener;
use attestor_listeners::sources::evm::HttpEvmSource;
use attestor_listeners::sources::solana::HttpSolanaSource;
use attestor_protocol::chain::ChainClient;
use attestor_protocol::client::HttpPeerTransport;
use attestor_protocol::throttle::Throttle;
use attestor_protocol::TaskContext;
use attestor_types::config::NodeConfig;
use attestor_types::error::OracleError;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Plugin dispatched for webhook-driven balance deltas.
const WEBHOOK_PLUGIN_ID: &str = "balance_updater";

/// Builds and runs one node process.
pub struct NodeBuilder {
    config: NodeConfig,
    keys: NodeKeys,
    registry: PluginRegistry,
    listeners: Vec<Arc<dyn Listener>>,
    cache: Arc<SharedCache>,
    throttle: Arc<Throttle>,
    chain: Arc<ChainClient>,
}

impl NodeBuilder {
    /// Loads and validates the configuration file, then prepares the shared
    /// process state.
    pub fn from_config_path(path: &Path) -> Result<Self, OracleError> {
        Self::from_config(NodeConfig::load(path)?)
    }

    /// Prepares shared process state from an already validated config.
    pub fn from_config(config: NodeConfig) -> Result<Self, OracleError> {
        let keys = NodeKeys::from_hex(&config.private_key, &config.public_key)?;
        let chain = Arc::new(ChainClient::new(&config.abstraction_chain)?);
        Ok(Self {
            config,
            keys,
            registry: PluginRegistry::new(),
            listeners: Vec::new(),
            cache: Arc::new(SharedCache::new()),
            throttle: Arc::new(Throttle::new()),
            chain,
        })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The shared cache handle, for plugins that keep allow-lists or
    /// cursors.
    pub fn cache(&self) -> Arc<SharedCache> {
        Arc::clone(&self.cache)
    }

    /// The abstraction-chain client handle.
    pub fn chain(&self) -> Arc<ChainClient> {
        Arc::clone(&self.chain)
    }

    /// Free-form settings for one plugin id from the config file.
    pub fn plugin_settings(&self, plugin_id: &str) -> Option<&serde_yaml::Value> {
        self.config.plugins.get(plugin_id)
    }

    /// The freshness window plugins pass to
    /// `attestor_crypto::auth::verify_auth` for end-user envelopes.
    pub fn auth_signature_max_age_ms(&self) -> u64 {
        self.config.auth.signature_max_age_ms
    }

    /// Registers a plugin handler.
    pub fn register_plugin(&mut self, plugin: Arc<dyn ErasedPlugin>) -> Result<(), OracleError> {
        self.registry.register(plugin)
    }

    /// Attaches an arbitrary listener.
    pub fn add_listener(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    /// Attaches an EVM log listener wired to the configured `rpc[source]`
    /// pool, rate limit, and per-listener tuning.
    pub fn add_evm_listener(
        &mut self,
        id: &str,
        source: &str,
        plugin_id: &str,
        addresses: Vec<String>,
    ) -> Result<(), OracleError> {
        let providers = self.rpc_providers(source)?;
        let source_client = Arc::new(HttpEvmSource::from_providers(providers)?);
        let listener = EvmListener::new(
            id,
            source,
            plugin_id,
            addresses,
            self.config.listener_tuning(id),
            self.config.rate_limit_for(source),
            source_client,
            self.chain.clone(),
            self.cache(),
            Arc::clone(&self.throttle),
            self.task_context()?,
        );
        self.listeners.push(Arc::new(listener));
        Ok(())
    }

    /// Attaches a Solana signature listener for one watched program.
    pub fn add_solana_listener(
        &mut self,
        id: &str,
        source: &str,
        plugin_id: &str,
        program: &str,
    ) -> Result<(), OracleError> {
        let providers = self.rpc_providers(source)?;
        let source_client = Arc::new(HttpSolanaSource::from_providers(providers)?);
        let listener = SolanaListener::new(
            id,
            source,
            plugin_id,
            program,
            self.config.listener_tuning(id),
            self.config.rate_limit_for(source),
            source_client,
            self.chain.clone(),
            self.cache(),
            Arc::clone(&self.throttle),
            self.task_context()?,
        );
        self.listeners.push(Arc::new(listener));
        Ok(())
    }

    fn rpc_providers(
        &self,
        source: &str,
    ) -> Result<&[attestor_types::config::RpcProviderConfig], OracleError> {
        self.config
            .rpc
            .get(source)
            .map(Vec::as_slice)
            .ok_or_else(|| OracleError::Config(format!("no rpc providers for source {source}")))
    }

    /// The process-wide task context. Because the registry is frozen into an
    /// `Arc` here, every plugin must be registered before the first call.
    fn task_context(&self) -> Result<Arc<TaskContext>, OracleError> {
        // Rebuilt per call site during wiring; cheap, and keeps the builder
        // mutable until `run`.
        let registry = Arc::new(clone_registry(&self.registry));
        Ok(Arc::new(TaskContext {
            keys: self.keys.clone(),
            peers: self.config.peers.clone(),
            registry,
            transport: Arc::new(HttpPeerTransport::new(Duration::from_millis(
                self.config.peer_timeout_ms.max(1_000),
            ))?),
            peer_timeout: Duration::from_millis(self.config.peer_timeout_ms),
            min_signatures_required: self.config.min_signatures_required,
        }))
    }

    /// Serves every surface until the process exits.
    pub async fn run(self) -> anyhow::Result<()> {
        attestor_telemetry::metrics::install();
        let config = self.config.clone();
        let registry = Arc::new(self.registry);
        if registry.ids().is_empty() {
            tracing::warn!(
                target: "node",
                "no plugins registered; peer and task endpoints will answer 404"
            );
        }

        let transport = Arc::new(HttpPeerTransport::new(Duration::from_millis(
            config.peer_timeout_ms.max(1_000),
        ))?);
        let context = Arc::new(TaskContext {
            keys: self.keys.clone(),
            peers: config.peers.clone(),
            registry: Arc::clone(&registry),
            transport,
            peer_timeout: Duration::from_millis(config.peer_timeout_ms),
            min_signatures_required: config.min_signatures_required,
        });

        let primary_public =
            attestor_crypto::public_key_from_hex(config.effective_primary_public_key())?;
        let peer_state = Arc::new(PeerState {
            registry: Arc::clone(&registry),
            keys: self.keys.clone(),
            primary_public,
        });
        let peer_addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        tokio::spawn(attestor_gateway::serve::serve(
            attestor_gateway::peer::router(peer_state),
            peer_addr,
            "peer",
        ));

        let api_state = Arc::new(ApiState {
            context: Arc::clone(&context),
            sources: config.rpc.keys().cloned().collect(),
            cache: Arc::clone(&self.cache),
            helius: config.webhooks.helius.clone(),
            webhook_plugin_id: WEBHOOK_PLUGIN_ID.to_string(),
        });
        let api_addr: SocketAddr = ([0, 0, 0, 0], config.api_port).into();
        tokio::spawn(attestor_gateway::serve::serve(
            attestor_gateway::api::router(api_state),
            api_addr,
            "api",
        ));

        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
        tokio::spawn(attestor_telemetry::http::run_server(metrics_addr));

        // Only the primary observes sources and initiates tasks.
        if config.primary {
            let scheduler = Scheduler::new();
            for listener in &self.listeners {
                scheduler.register(Arc::clone(listener));
            }
            scheduler.start();
            tracing::info!(
                target: "node",
                listeners = self.listeners.len(),
                "primary node started"
            );
        } else {
            tracing::info!(target: "node", "secondary node started");
        }

        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;
        tracing::info!(target: "node", "shutting down");
        Ok(())
    }
}

// PluginRegistry is deliberately not Clone; wiring-time task contexts for
// listeners need their own frozen snapshot of it.
fn clone_registry(registry: &PluginRegistry) -> PluginRegistry {
    let mut copy = PluginRegistry::new();
    for id in registry.ids() {
        if let Ok(plugin) = registry.get(id) {
            let _ = copy.register(plugin);
        }
    }
    copy
}
