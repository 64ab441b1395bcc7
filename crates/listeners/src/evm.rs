//! The EVM log listener.
//!
//! Scans a bounded block window per run, orders events by
//! `(blockNumber, logIndex)`, deduplicates on `txHash-logIndex`, batches up
//! to `batchSize` events into one task input, and dispatches through the
//! plugin registry by id. Progress lives in the shared cache; replaying a
//! window therefore produces no new effects.

use crate::ChainIndex;
use attestor_api::cache::SharedCache;
use attestor_api::listener::Listener;
use attestor_api::source::{EvmLog, EvmSource};
use attestor_protocol::throttle::Throttle;
use attestor_protocol::{Task, TaskContext};
use attestor_types::config::ListenerTuning;
use attestor_types::error::OracleError;
use attestor_types::time::now_ms;
use attestor_types::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Blocks held back from the head to tolerate source-chain reorgs.
const REORG_LAG: u64 = 10;
/// How long a fetched head height stays reusable.
const HEAD_TTL: Duration = Duration::from_secs(5);

/// Configuration and collaborators of one EVM listener instance.
pub struct EvmListener {
    id: String,
    source: String,
    plugin_id: String,
    addresses: Vec<String>,
    tuning: ListenerTuning,
    rate_limit: u32,
    source_client: Arc<dyn EvmSource>,
    chain: Arc<dyn ChainIndex>,
    cache: Arc<SharedCache>,
    throttle: Arc<Throttle>,
    tasks: Arc<TaskContext>,
}

impl EvmListener {
    /// Builds a listener for one source chain.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        plugin_id: impl Into<String>,
        addresses: Vec<String>,
        tuning: ListenerTuning,
        rate_limit: u32,
        source_client: Arc<dyn EvmSource>,
        chain: Arc<dyn ChainIndex>,
        cache: Arc<SharedCache>,
        throttle: Arc<Throttle>,
        tasks: Arc<TaskContext>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            plugin_id: plugin_id.into(),
            addresses,
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
        format!("listener:{}:cursor", self.id)
    }

    fn head_key(&self) -> String {
        format!("head:{}", self.source)
    }

    fn seen_key(&self, event_id: &str) -> String {
        format!("seen:{}:{event_id}", self.source)
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.tuning.cache_ttl_ms)
    }

    /// The current head, reusing a recently cached value.
    async fn head(&self) -> Result<u64, OracleError> {
        if let Some(head) = self.cache.get(&self.head_key()).and_then(|v| v.as_u64()) {
            return Ok(head);
        }
        let head = self
            .throttle
            .retry_on_429(&self.source, self.rate_limit, || {
                self.source_client.head_number()
            })
            .await?;
        self.cache
            .insert(self.head_key(), Value::Timestamp(head), HEAD_TTL);
        Ok(head)
    }

    /// Where this run's window starts: after the cursor, or, on a cold
    /// start, after whatever the abstraction chain has already indexed.
    async fn window_start(&self, safe_head: u64) -> Result<u64, OracleError> {
        if let Some(cursor) = self.cache.get(&self.cursor_key()).and_then(|v| v.as_u64()) {
            return Ok(cursor + 1);
        }
        match self.chain.indexed_height(&self.source).await? {
            Some(height) => Ok(height + 1),
            None => Ok(safe_head.saturating_sub(self.tuning.block_height_increment)),
        }
    }

    fn advance_cursor(&self, block: u64) {
        self.cache
            .insert(self.cursor_key(), Value::Timestamp(block), self.cache_ttl());
    }

    /// Dispatches one batch as a single task. The input carries the source
    /// name and the ordered event sequence.
    async fn dispatch(&self, batch: &[EvmLog]) -> Result<(), OracleError> {
        let input = Value::map([
            ("source", Value::Text(self.source.clone())),
            (
                "events",
                Value::Array(batch.iter().map(EvmLog::to_value).collect()),
            ),
        ]);
        Task::new(Arc::clone(&self.tasks), self.plugin_id.clone(), input)
            .start()
            .await?;
        for log in batch {
            self.cache.insert(
                self.seen_key(&log.event_id()),
                Value::Bool(true),
                self.cache_ttl(),
            );
        }
        attestor_telemetry::metrics::inc_listener_events(&self.id, batch.len() as u64);
        Ok(())
    }
}

#[async_trait]
impl Listener for EvmListener {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<u64, OracleError> {
        let head = self.head().await?;
        let safe_head = head.saturating_sub(REORG_LAG);
        let start = self.window_start(safe_head).await?;
        if start > safe_head {
            return Ok(now_ms() + self.tuning.throttle_on_success_ms);
        }
        let end = safe_head.min(start + self.tuning.block_height_increment.max(1) - 1);

        let mut logs = self
            .throttle
            .retry_on_429(&self.source, self.rate_limit, || {
                self.source_client.logs(start, end, &self.addresses)
            })
            .await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        logs.retain(|log| !self.cache.contains(&self.seen_key(&log.event_id())));

        tracing::debug!(
            target: "listener",
            listener = %self.id,
            start,
            end,
            events = logs.len(),
            "scanned window"
        );

        for batch in logs.chunks(self.tuning.batch_size.max(1)) {
            if let Err(err) = self.dispatch(batch).await {
                // The cursor stays at the last fully dispatched batch; the
                // scheduler backs off and the window replays, with the seen
                // markers suppressing anything already dispatched.
                return Err(err);
            }
            if let Some(last) = batch.last() {
                // Only completed blocks are safe to skip on replay.
                if last.block_number > 0 {
                    self.advance_cursor(last.block_number - 1);
                }
            }
        }
        self.advance_cursor(end);

        let caught_up = end >= safe_head;
        if caught_up {
            Ok(now_ms() + self.tuning.throttle_on_success_ms)
        } else {
            Ok(now_ms())
        }
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
    use std::sync::atomic::{AtomicU64, Ordering};
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

    /// Records every input it is driven with.
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

    struct FakeEvm {
        head: AtomicU64,
        logs: Vec<EvmLog>,
    }

    #[async_trait]
    impl EvmSource for FakeEvm {
        async fn head_number(&self) -> Result<u64, OracleError> {
            Ok(self.head.load(Ordering::SeqCst))
        }
        async fn logs(
            &self,
            from: u64,
            to: u64,
            _addresses: &[String],
        ) -> Result<Vec<EvmLog>, OracleError> {
            Ok(self
                .logs
                .iter()
                .filter(|log| log.block_number >= from && log.block_number <= to)
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

    fn log(block: u64, index: u64) -> EvmLog {
        EvmLog {
            block_number: block,
            log_index: index,
            tx_hash: format!("0xtx{block}"),
            address: "0xc0ffee".into(),
            topics: vec![],
            data: "0x".into(),
        }
    }

    struct Fixture {
        listener: EvmListener,
        inputs: Arc<Mutex<Vec<Value>>>,
        cache: Arc<SharedCache>,
    }

    fn fixture(head: u64, logs: Vec<EvmLog>, indexed: Option<u64>, batch_size: usize) -> Fixture {
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
        let listener = EvmListener::new(
            "evm_events",
            "ethereum",
            "recorder",
            vec!["0xc0ffee".into()],
            ListenerTuning {
                block_height_increment: 100,
                throttle_on_success_ms: 15_000,
                batch_size,
                cache_ttl_ms: 300_000,
            },
            50,
            Arc::new(FakeEvm {
                head: AtomicU64::new(head),
                logs,
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

    fn event_ids(input: &Value) -> Vec<(u64, u64)> {
        match input.get("events") {
            Some(Value::Array(events)) => events
                .iter()
                .map(|event| {
                    (
                        event.get("blockNumber").unwrap().as_u64().unwrap(),
                        event.get("logIndex").unwrap().as_u64().unwrap(),
                    )
                })
                .collect(),
            _ => panic!("input has no event list"),
        }
    }

    #[tokio::test]
    async fn scans_from_indexed_height_and_orders_events() {
        // Head 1020, lag 10 → safe head 1010; indexed 999 → window [1000, 1010].
        let fx = fixture(
            1020,
            vec![log(1005, 2), log(1001, 0), log(1005, 0), log(1011, 0)],
            Some(999),
            10,
        );
        let next = fx.listener.run().await.unwrap();
        assert!(next > now_ms(), "caught up, so the listener throttles");

        let inputs = fx.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(
            event_ids(&inputs[0]),
            vec![(1001, 0), (1005, 0), (1005, 2)],
            "events are (blockNumber, logIndex) ordered; 1011 is past the lag"
        );
    }

    #[tokio::test]
    async fn replaying_a_window_dispatches_nothing_new() {
        let fx = fixture(1020, vec![log(1001, 0), log(1002, 0)], Some(999), 10);
        fx.listener.run().await.unwrap();
        assert_eq!(fx.inputs.lock().unwrap().len(), 1);

        // Clear the cursor but keep the seen markers: a replayed window must
        // not dispatch the same events twice.
        fx.cache.remove("listener:evm_events:cursor");
        fx.listener.run().await.unwrap();
        assert_eq!(fx.inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batches_split_at_batch_size() {
        let fx = fixture(
            1020,
            vec![
                log(1001, 0),
                log(1001, 1),
                log(1002, 0),
                log(1003, 0),
                log(1004, 0),
            ],
            Some(999),
            2,
        );
        fx.listener.run().await.unwrap();
        let inputs = fx.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 3, "five events at batch size two");
        assert_eq!(event_ids(&inputs[0]).len(), 2);
        assert_eq!(event_ids(&inputs[2]).len(), 1);
    }

    #[tokio::test]
    async fn empty_window_throttles_without_dispatch() {
        let fx = fixture(1020, vec![], Some(1010), 10);
        let next = fx.listener.run().await.unwrap();
        assert!(next >= now_ms() + 14_000);
        assert!(fx.inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backlog_requests_an_immediate_refire() {
        // Indexed far behind: the window covers [0+..], well short of the
        // safe head, so the listener asks to run again immediately.
        let fx = fixture(1020, vec![], Some(500), 10);
        let next = fx.listener.run().await.unwrap();
        assert!(next <= now_ms() + 1000);
        // Cursor advanced by one increment.
        let cursor = fx
            .cache
            .get("listener:evm_events:cursor")
            .and_then(|v| v.as_u64())
            .unwrap();
        assert_eq!(cursor, 600);
    }
}
