//! Multi-node protocol runs over an in-memory peer transport.

use async_trait::async_trait;
use attestor_api::plugin::{ErasedPlugin, PeerPrepared, Plugin};
use attestor_api::registry::PluginRegistry;
use attestor_crypto::NodeKeys;
use attestor_protocol::transport::{PeerTransport, PreparedContribution};
use attestor_protocol::{Task, TaskContext};
use attestor_types::codec;
use attestor_types::config::PeerConfig;
use attestor_types::error::OracleError;
use attestor_types::model::ValidateRequest;
use attestor_types::value::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, PartialEq)]
enum PluginMode {
    Normal,
    PermanentAtPrepare,
    NonErrorAtProcess,
    DuplicateAtExecute,
}

#[derive(Default)]
struct Stats {
    prepare: AtomicU32,
    process: AtomicU32,
    validate: AtomicU32,
    execute: AtomicU32,
    executed_artifact: Mutex<Option<Value>>,
}

/// A forwarder-shaped plugin: prepare echoes the input, process builds a
/// transaction body with a signer list, validate appends this node's
/// signature marker, execute records the final artifact.
struct ForwarderPlugin {
    node_label: String,
    mode: PluginMode,
    stats: Arc<Stats>,
}

impl ForwarderPlugin {
    fn new(node_label: &str, mode: PluginMode) -> (Arc<Self>, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        (
            Arc::new(Self {
                node_label: node_label.to_string(),
                mode,
                stats: Arc::clone(&stats),
            }),
            stats,
        )
    }
}

#[async_trait]
impl Plugin for ForwarderPlugin {
    type Input = Value;
    type Prepared = Value;
    type Aggregated = Value;
    type Output = Value;

    fn id(&self) -> &str {
        "forwarder"
    }

    async fn prepare(&self, input: &Value) -> Result<Value, OracleError> {
        self.stats.prepare.fetch_add(1, Ordering::SeqCst);
        if self.mode == PluginMode::PermanentAtPrepare {
            return Err(OracleError::Permanent("malformed event payload".into()));
        }
        // Deterministic across honest nodes: the preparation is a pure
        // function of the input.
        Ok(input.clone())
    }

    async fn process(&self, prepared: &[PeerPrepared<Value>]) -> Result<Value, OracleError> {
        self.stats.process.fetch_add(1, Ordering::SeqCst);
        if self.mode == PluginMode::NonErrorAtProcess {
            return Err(OracleError::NonError("event already processed".into()));
        }
        let signers = prepared
            .iter()
            .map(|record| Value::Text(record.public_key_hex.clone()))
            .collect();
        Ok(Value::map([
            ("body", prepared[0].prepared.clone()),
            ("signers", Value::Array(signers)),
            ("signatures", Value::Array(vec![])),
        ]))
    }

    async fn validate(&self, aggregated: Value, _my: &Value) -> Result<Value, OracleError> {
        self.stats.validate.fetch_add(1, Ordering::SeqCst);
        let mut signatures = match aggregated.get("signatures") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(OracleError::Validation("missing signature list".into())),
        };
        signatures.push(Value::Text(format!("sig:{}", self.node_label)));
        Ok(Value::map([
            (
                "body",
                aggregated.get("body").cloned().unwrap_or(Value::Null),
            ),
            (
                "signers",
                aggregated.get("signers").cloned().unwrap_or(Value::Null),
            ),
            ("signatures", Value::Array(signatures)),
        ]))
    }

    async fn execute(&self, aggregated: Value) -> Result<Value, OracleError> {
        self.stats.execute.fetch_add(1, Ordering::SeqCst);
        *self.stats.executed_artifact.lock().unwrap() = Some(aggregated);
        if self.mode == PluginMode::DuplicateAtExecute {
            return Err(OracleError::DuplicateSubmission);
        }
        Ok(Value::Null)
    }
}

enum PeerSim {
    Reachable {
        keys: NodeKeys,
        plugin: Arc<dyn ErasedPlugin>,
    },
    ConnectError,
    Hang,
}

/// An in-memory cluster standing in for the HTTP transport. Behaves like the
/// real client: it signs prepare replies with the peer's key and checks the
/// primary's signature before running a peer validate.
struct MemoryTransport {
    peers: HashMap<String, PeerSim>,
    primary_public_hex: String,
    prepare_attempts: AtomicU32,
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn prepare(
        &self,
        peer: &PeerConfig,
        _plugin_id: &str,
        input: &Value,
    ) -> Result<PreparedContribution, OracleError> {
        self.prepare_attempts.fetch_add(1, Ordering::SeqCst);
        match self.peers.get(&peer.id) {
            Some(PeerSim::Reachable { keys, plugin }) => {
                let prepared = plugin.prepare(input.clone()).await?;
                let encoded = codec::encode(&prepared);
                let signature = keys.sign(&encoded).to_vec();
                Ok(PreparedContribution {
                    prepared,
                    encoded,
                    signature,
                })
            }
            Some(PeerSim::ConnectError) | None => {
                Err(OracleError::Transport(format!("connect {}: refused", peer.id)))
            }
            Some(PeerSim::Hang) => std::future::pending().await,
        }
    }

    async fn validate(
        &self,
        peer: &PeerConfig,
        request: &ValidateRequest,
    ) -> Result<Value, OracleError> {
        match self.peers.get(&peer.id) {
            Some(PeerSim::Reachable { plugin, .. }) => {
                let primary =
                    attestor_crypto::public_key_from_hex(&self.primary_public_hex).unwrap();
                let encoded = codec::encode(&request.prepared_data);
                if !attestor_crypto::verify(&encoded, &request.signature, &primary) {
                    return Err(OracleError::Validation("Invalid signature".into()));
                }
                plugin
                    .validate(request.input.clone(), request.prepared_data.clone())
                    .await
            }
            _ => Err(OracleError::Transport(format!("connect {}: refused", peer.id))),
        }
    }
}

struct Cluster {
    context: Arc<TaskContext>,
    primary_stats: Arc<Stats>,
    peer_stats: HashMap<String, Arc<Stats>>,
    transport_attempts: Arc<MemoryTransport>,
}

/// Builds a primary plus the given peer simulations.
fn cluster(
    primary_mode: PluginMode,
    peer_sims: Vec<(&str, Option<PluginMode>)>,
    min_signatures_required: u32,
    peer_timeout: Duration,
) -> Cluster {
    let primary_keys = NodeKeys::generate();
    let primary_public_hex = primary_keys.public_key_hex();

    let (primary_plugin, primary_stats) = ForwarderPlugin::new("A", primary_mode);
    let mut registry = PluginRegistry::new();
    registry.register(primary_plugin).unwrap();

    let mut peers = Vec::new();
    let mut sims = HashMap::new();
    let mut peer_stats = HashMap::new();
    for (label, mode) in peer_sims {
        let keys = NodeKeys::generate();
        peers.push(PeerConfig {
            id: label.to_string(),
            public_key: keys.public_key_hex(),
            address: format!("{label}:7740"),
        });
        let sim = match mode {
            Some(mode) => {
                let (plugin, stats) = ForwarderPlugin::new(label, mode);
                peer_stats.insert(label.to_string(), stats);
                PeerSim::Reachable { keys, plugin }
            }
            None => PeerSim::ConnectError,
        };
        sims.insert(label.to_string(), sim);
    }

    let transport = Arc::new(MemoryTransport {
        peers: sims,
        primary_public_hex,
        prepare_attempts: AtomicU32::new(0),
    });

    let context = Arc::new(TaskContext {
        keys: primary_keys,
        peers,
        registry: Arc::new(registry),
        transport: transport.clone(),
        peer_timeout,
        min_signatures_required,
    });
    Cluster {
        context,
        primary_stats,
        peer_stats,
        transport_attempts: transport,
    }
}

fn event_input() -> Value {
    Value::map([
        ("chain", Value::Text("ethereum".into())),
        ("txHash", Value::Text("0xfeedbeef".into())),
    ])
}

fn signature_labels(artifact: &Value) -> Vec<String> {
    match artifact.get("signatures") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_text().unwrap().to_string())
            .collect(),
        _ => panic!("artifact has no signature list: {artifact:?}"),
    }
}

#[tokio::test]
async fn three_node_happy_path_signs_in_order() {
    let cluster = cluster(
        PluginMode::Normal,
        vec![
            ("B", Some(PluginMode::Normal)),
            ("C", Some(PluginMode::Normal)),
        ],
        3,
        Duration::from_secs(5),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    task.start().await.unwrap();

    // Each peer prepared exactly once.
    for label in ["B", "C"] {
        assert_eq!(
            cluster.peer_stats[label].prepare.load(Ordering::SeqCst),
            1,
            "peer {label} prepare count"
        );
        assert_eq!(cluster.peer_stats[label].validate.load(Ordering::SeqCst), 1);
    }
    assert_eq!(cluster.primary_stats.process.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 1);

    let artifact = cluster
        .primary_stats
        .executed_artifact
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(
        signature_labels(&artifact),
        vec!["sig:A", "sig:B", "sig:C"],
        "primary signs first, peers follow in configuration order"
    );
}

#[tokio::test(start_paused = true)]
async fn two_of_three_succeeds_under_partition() {
    let cluster = cluster(
        PluginMode::Normal,
        vec![("B", Some(PluginMode::Normal)), ("C", None)],
        2,
        Duration::from_millis(500),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    task.start().await.unwrap();

    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 1);
    let artifact = cluster
        .primary_stats
        .executed_artifact
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(signature_labels(&artifact), vec!["sig:A", "sig:B"]);
}

#[tokio::test(start_paused = true)]
async fn quorum_starvation_fails_before_process() {
    let cluster = cluster(
        PluginMode::Normal,
        vec![("B", Some(PluginMode::Normal)), ("C", None)],
        3,
        Duration::from_millis(300),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    let err = task.start().await.unwrap_err();
    assert!(matches!(
        err,
        OracleError::InsufficientPeers {
            collected: 2,
            required: 3
        }
    ));
    assert_eq!(cluster.primary_stats.process.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_event_short_circuits_at_process() {
    let cluster = cluster(
        PluginMode::NonErrorAtProcess,
        vec![("B", Some(PluginMode::Normal))],
        2,
        Duration::from_secs(5),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    let output = task.start().await.unwrap();
    assert_eq!(output, Value::Null);
    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 0);
    assert_eq!(cluster.primary_stats.validate.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_submission_at_execute_is_success() {
    let cluster = cluster(
        PluginMode::DuplicateAtExecute,
        vec![("B", Some(PluginMode::Normal))],
        2,
        Duration::from_secs(5),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    let output = task.start().await.unwrap();
    assert_eq!(output, Value::Null);
    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn permanent_error_completes_vacuously_without_peer_io() {
    let cluster = cluster(
        PluginMode::PermanentAtPrepare,
        vec![("B", Some(PluginMode::Normal))],
        2,
        Duration::from_secs(5),
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    let output = task.start().await.unwrap();
    assert_eq!(output, Value::Null);
    assert_eq!(
        cluster
            .transport_attempts
            .prepare_attempts
            .load(Ordering::SeqCst),
        0,
        "peers must not be dialed for a permanent reject"
    );
    assert_eq!(cluster.primary_stats.execute.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn single_node_quorum_needs_no_peer_io() {
    let cluster = cluster(PluginMode::Normal, vec![], 1, Duration::from_secs(5));
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    task.start().await.unwrap();
    assert_eq!(
        cluster
            .transport_attempts
            .prepare_attempts
            .load(Ordering::SeqCst),
        0
    );
    let artifact = cluster
        .primary_stats
        .executed_artifact
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(signature_labels(&artifact), vec!["sig:A"]);
}

#[tokio::test]
async fn zero_timeout_accepts_no_peer_contribution() {
    let cluster = cluster(
        PluginMode::Normal,
        vec![("B", Some(PluginMode::Normal))],
        2,
        Duration::ZERO,
    );
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    let err = task.start().await.unwrap_err();
    assert!(matches!(err, OracleError::InsufficientPeers { .. }));

    // With a quorum of one, the same zero deadline completes locally.
    let cluster = cluster_single_with_zero_timeout();
    let task = Task::new(cluster.context.clone(), "forwarder", event_input());
    task.start().await.unwrap();
}

fn cluster_single_with_zero_timeout() -> Cluster {
    cluster(
        PluginMode::Normal,
        vec![("B", Some(PluginMode::Normal))],
        1,
        Duration::ZERO,
    )
}

#[tokio::test(start_paused = true)]
async fn hanging_peer_with_quorum_of_two_still_completes() {
    // B answers, C hangs past the deadline.
    let primary_keys = NodeKeys::generate();
    let (primary_plugin, primary_stats) = ForwarderPlugin::new("A", PluginMode::Normal);
    let mut registry = PluginRegistry::new();
    registry.register(primary_plugin).unwrap();

    let keys_b = NodeKeys::generate();
    let keys_c = NodeKeys::generate();
    let (plugin_b, _stats_b) = ForwarderPlugin::new("B", PluginMode::Normal);
    let peers = vec![
        PeerConfig {
            id: "B".into(),
            public_key: keys_b.public_key_hex(),
            address: "B:7740".into(),
        },
        PeerConfig {
            id: "C".into(),
            public_key: keys_c.public_key_hex(),
            address: "C:7740".into(),
        },
    ];
    let mut sims = HashMap::new();
    sims.insert(
        "B".to_string(),
        PeerSim::Reachable {
            keys: keys_b,
            plugin: plugin_b,
        },
    );
    sims.insert("C".to_string(), PeerSim::Hang);
    let transport = Arc::new(MemoryTransport {
        peers: sims,
        primary_public_hex: primary_keys.public_key_hex(),
        prepare_attempts: AtomicU32::new(0),
    });
    let context = Arc::new(TaskContext {
        keys: primary_keys,
        peers,
        registry: Arc::new(registry),
        transport,
        peer_timeout: Duration::from_millis(400),
        min_signatures_required: 2,
    });

    let task = Task::new(context, "forwarder", event_input());
    task.start().await.unwrap();
    assert_eq!(primary_stats.execute.load(Ordering::SeqCst), 1);
    let artifact = primary_stats
        .executed_artifact
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(signature_labels(&artifact), vec!["sig:A", "sig:B"]);
}

#[tokio::test]
async fn unknown_plugin_is_reported_as_not_found() {
    let cluster = cluster(PluginMode::Normal, vec![], 1, Duration::from_secs(1));
    let task = Task::new(cluster.context.clone(), "missing", event_input());
    let err = task.start().await.unwrap_err();
    assert!(matches!(err, OracleError::NotFound(_)));
}
