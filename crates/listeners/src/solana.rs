//! The Solana signature listener.
//!
//! Watches a program for new confirmed signatures, deduplicates on the
//! signature string, and dispatches batches through the registry. The dedup
//! cache stores only a boolean "seen" sentinel; transaction bodies are not
//! cacheable.

use crate::ChainIndex;
use attestor_api::cache::SharedCache;
use attestor_api::listener::Listener;
use attestor_api::source::{SolanaSignature, SolanaSource};
use attestor_protocol::throttle::Throttle;
use attestor_protocol::{Task, TaskContext};
use attestor_types::config::ListenerTuning;
use attestor_types::error::OracleError;
use attestor_types::time::now_ms;
use attestor_types::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Configuration and collaborators of one Solana listener instance.
pub struct SolanaListener {
    id: String,
    source: String,
    plugin_id: String,
    program: String,
    tuning: ListenerTuning,
    rate_limit: u32,
    source_client: Arc<dyn SolanaSource>,
    chain: Arc<dyn ChainIndex>,
    cache: Arc<SharedCache>,
    throttle: Arc<Throttle>,
    tasks: Arc<TaskContext>,
}

impl SolanaListener {
    /// Builds a listener for one watched program.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        plugin_id: impl Into<String>,
        program: impl Into<String>,
        tuning: ListenerTuning,
        rate_limit: u32,
        source_client: Arc<dyn SolanaSource>,
        chain: Arc<dyn ChainIndex>,
        cache: Arc<SharedCache>,
        throttle: Arc<Throttle>,
        tasks: Arc<TaskContext>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            plugin_id: plugin_id.into(),
            program: program.into(),
            tuning,
            rate_limit,
            source_client,
            chain,
            cache,
            throttle,
            tasks,
        }
    }

    fn cursor_key(&self) -> String {
        format!("listener:{}:slot", self.id)
    }

    fn seen_key(&self, signature: &str) -> String {
        format!("seen:{}:{signature}", self.source)
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.tuning.cache_ttl_ms)
    }

    async fn cursor(&self) -> Result<u64, OracleError> {
        if let Some(slot) = self.cache.get(&self.cursor_key()).and_then(|v| v.as_u64()) {
            return Ok(slot);
        }
        if let Some(height) = self.chain.indexed_height(&self.source).await? {
            return Ok(height);
        }
        // Nothing known anywhere: start from the current confirmed slot
        // rather than replaying the program's whole history.
        self.throttle
            .retry_on_429(&self.source, self.rate_limit, || {
                self.source_client.head_slot()
            })
            .await
    }

    async fn dispatch(&self, batch: &[SolanaSignature]) -> Result<(), OracleError> {
        let input = Value::map([
            ("source", Value::Text(self.source.clone())),
            ("program", Value::Text(self.program.clone())),
            (
                "signatures",
                Value::Array(
                    batch
                        .iter()
                        .map(|sig| {
                            Value::map([
                                ("signature", Value::Text(sig.signature.clone())),
                                ("slot", Value::Timestamp(sig.slot)),
                            ])
                        })
                        .collect(),
                ),
            ),
        ]);
        Task::new(Arc::clone(&self.tasks), self.plugin_id.clone(), input)
            .start()
            .await?;
        for sig in batch {
            // Only the boolean sentinel goes into the cache.
            self.cache.insert(
                self.seen_key(&sig.signature),
                Value::Bool(true),
                self.cache_ttl(),
            );
        }
        attestor_telemetry::metrics::inc_listener_events(&self.id, batch.len() as u64);
        Ok(())
    }
}

#[async_trait]
impl Listener for SolanaListener {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<u64, OracleError> {
        let cursor = self.cursor().await?;
        let mut signatures = self
            .throttle
            .retry_on_429(&self.source, self.rate_limit, || {
                self.source_client.signatures_since(&self.program, cursor)
            })
            .await?;
        signatures.sort_by(|a, b| {
            a.slot
                .cmp(&b.slot)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        signatures.retain(|sig| !self.cache.contains(&self.seen_key(&sig.signature)));

        if signatures.is_empty() {
            self.cache.insert(
                self.cursor_key(),
                Value::Timestamp(cursor),
                self.cache_ttl(),
            );
            return Ok(now_ms() + self.tuning.throttle_on_success_ms);
        }

        tracing::debug!(
            target: "listener",
            listener = %self.id,
            cursor,
            signatures = signatures.len(),
            "found new program signatures"
        );

        let mut last_slot = cursor;
        for batch in signatures.chunks(self.tuning.batch_size.max(1)) {
            self.dispatch(batch).await?;
            if let Some(last) = batch.last() {
                last_slot = last_slot.max(last.slot);
                self.cache.insert(
                    self.cursor_key(),
                    Value::Timestamp(last_slot),
                    self.cache_ttl(),
                );
            }
        }
        Ok(now_ms() + self.tuning.throttle_on_success_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestor_api::plugin::{PeerPrepared, Plugin};
    use attestor_api::registry::PluginRegistry;
    use attestor_crypto::NodeKeys;
    use attestor_protocol::transport::{PeerTransport, PreparedContribution};
    use attestor_types::config::PeerConfig;
    use attestor_types::model::ValidateRequest;
    use std::sync::Mutex;

    struct NoPeers;

    #[async_trait]
    impl PeerTransport for NoPeers {
        async fn prepare(
            &self,
            _peer: &PeerConfig,
            _plugin_id: &str,
            _input: &Value,
        ) -> Result<PreparedContribution, OracleError> {
            Err(OracleError::Transport("no peers in tests".into()))
        }
        async fn validate(
            &self,
            _peer: &PeerConfig,
            _request: &ValidateRequest,
        ) -> Result<Value, OracleError> {
            Err(OracleError::Transport("no peers in tests".into()))
        }
    }

    struct RecordingPlugin {
        inputs: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        type Input = Value;
        type Prepared = Value;
        type Aggregated = Value;
        type Output = ();

        fn id(&self) -> &str {
            "recorder"
        }
        async fn prepare(&self, input: &Value) -> Result<Value, OracleError> {
            Ok(input.clone())
        }
        async fn process(&self, prepared: &[PeerPrepared<Value>]) -> Result<Value, OracleError> {
            self.inputs
                .lock()
                .unwrap()
                .push(prepared[0].prepared.clone());
            Ok(Value::Null)
        }
        async fn validate(&self, aggregated: Value, _my: &Value) -> Result<Value, OracleError> {
            Ok(aggregated)
        }
        async fn execute(&self, _aggregated: Value) -> Result<(), OracleError> {
            Ok(())
        }
    }

    struct FakeSolana {
        head: u64,
        signatures: Vec<SolanaSignature>,
    }

    #[async_trait]
    impl SolanaSource for FakeSolana {
        async fn head_slot(&self) -> Result<u64, OracleError> {
            Ok(self.head)
        }
        async fn signatures_since(
            &self,
            _program: &str,
            min_slot: u64,
        ) -> Result<Vec<SolanaSignature>, OracleError> {
            Ok(self
                .signatures
                .iter()
                .filter(|sig| sig.slot > min_slot)
                .cloned()
                .collect())
        }
    }

    struct FixedIndex(Option<u64>);

    #[async_trait]
    impl ChainIndex for FixedIndex {
        async fn indexed_height(&self, _source: &str) -> Result<Option<u64>, OracleError> {
            Ok(self.0)
        }
    }

    fn sig(signature: &str, slot: u64) -> SolanaSignature {
        SolanaSignature {
            signature: signature.into(),
            slot,
        }
    }

    struct Fixture {
        listener: SolanaListener,
        inputs: Arc<Mutex<Vec<Value>>>,
        cache: Arc<SharedCache>,
    }

    fn fixture(signatures: Vec<SolanaSignature>, indexed: Option<u64>) -> Fixture {
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(RecordingPlugin {
                inputs: Arc::clone(&inputs),
            }))
            .unwrap();
        let tasks = Arc::new(TaskContext {
            keys: NodeKeys::generate(),
            peers: vec![],
            registry: Arc::new(registry),
            transport: Arc::new(NoPeers),
            peer_timeout: Duration::from_millis(10),
            min_signatures_required: 1,
        });
        let cache = Arc::new(SharedCache::new());
        let listener = SolanaListener::new(
            "sol_events",
            "solana",
            "recorder",
            "Prog1111",
            ListenerTuning::default(),
            rate_limit_for_tests(),
            Arc::new(FakeSolana {
                head: 900,
                signatures,
            }),
            Arc::new(FixedIndex(indexed)),
            Arc::clone(&cache),
            Arc::new(Throttle::new()),
            tasks,
        );
        Fixture {
            listener,
            inputs,
            cache,
        }
    }

    fn rate_limit_for_tests() -> u32 {
        50
    }

    #[tokio::test]
    async fn dispatches_new_signatures_in_slot_order() {
        let fx = fixture(
            vec![sig("ccc", 820), sig("aaa", 810), sig("bbb", 815)],
            Some(800),
        );
        fx.listener.run().await.unwrap();
        let inputs = fx.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 1);
        let slots: Vec<u64> = match inputs[0].get("signatures") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.get("slot").unwrap().as_u64().unwrap())
                .collect(),
            _ => panic!("missing signatures"),
        };
        assert_eq!(slots, vec![810, 815, 820]);
        assert_eq!(
            fx.cache
                .get("listener:sol_events:slot")
                .and_then(|v| v.as_u64()),
            Some(820)
        );
    }

    #[tokio::test]
    async fn replay_is_suppressed_by_seen_sentinels() {
        let fx = fixture(vec![sig("aaa", 810)], Some(800));
        fx.listener.run().await.unwrap();
        assert_eq!(fx.inputs.lock().unwrap().len(), 1);

        // Losing the cursor replays the provider window; the sentinel keeps
        // the signature from dispatching again.
        fx.cache.remove("listener:sol_events:slot");
        fx.listener.run().await.unwrap();
        assert_eq!(fx.inputs.lock().unwrap().len(), 1);

        // The sentinel is a plain boolean, never a transaction body.
        assert_eq!(
            fx.cache.get("seen:solana:aaa"),
            Some(Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn cold_start_without_index_begins_at_the_head() {
        let fx = fixture(vec![sig("aaa", 810)], None);
        let next = fx.listener.run().await.unwrap();
        // Head is 900; the old signature at slot 810 is skipped entirely.
        assert!(fx.inputs.lock().unwrap().is_empty());
        assert!(next > now_ms());
    }
}
