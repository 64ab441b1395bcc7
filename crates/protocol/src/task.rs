//! The four-phase task coordinator.
//!
//! A [`Task`] coordinates exactly one request through
//! Prepare → Process → Validate → Execute. The task does not decide when to
//! run; listeners and the external API construct one and call
//! [`Task::start`]. Task state lives for one invocation and is never
//! persisted; the downstream chain's duplicate handling recovers anything
//! lost across a restart.

use crate::transport::PeerTransport;
use attestor_api::plugin::{ErasedPlugin, PeerPrepared};
use attestor_api::registry::PluginRegistry;
use attestor_crypto::NodeKeys;
use attestor_types::codec;
use attestor_types::config::PeerConfig;
use attestor_types::error::{ErrorCode, OracleError};
use attestor_types::model::{PeerPrepareRecord, ValidateRequest};
use attestor_types::value::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Process-wide handles a task runs against.
///
/// Built once at startup; every task clones the same `Arc`.
pub struct TaskContext {
    /// The local node's key material.
    pub keys: NodeKeys,
    /// The configured peer set, in configuration order. The local node is
    /// never an entry here.
    pub peers: Vec<PeerConfig>,
    /// The process-wide plugin registry.
    pub registry: Arc<PluginRegistry>,
    /// The peer RPC transport.
    pub transport: Arc<dyn PeerTransport>,
    /// Prepare fan-out deadline.
    pub peer_timeout: Duration,
    /// Quorum threshold, counting the local node.
    pub min_signatures_required: u32,
}

/// One protocol run for one request.
pub struct Task {
    context: Arc<TaskContext>,
    plugin_id: String,
    input: Value,
    started_at: Instant,
}

impl Task {
    /// Creates a task for a plugin id and input.
    pub fn new(context: Arc<TaskContext>, plugin_id: impl Into<String>, input: Value) -> Self {
        Self {
            context,
            plugin_id: plugin_id.into(),
            input,
            started_at: Instant::now(),
        }
    }

    /// Drives the task to a terminal state and returns the plugin output.
    ///
    /// Exactly two error conversions happen here and nowhere else: a
    /// `permanent_error` from the local prepare becomes a vacuous success
    /// (peers would reject the same input, so there is nothing to
    /// coordinate), and a `duplicate_submission` from execute becomes a
    /// success (the effect already exists downstream). A `non_error` from
    /// any phase also reports success. Everything else is logged with its
    /// tag and surfaced to the caller.
    pub async fn start(self) -> Result<Value, OracleError> {
        let plugin = self.context.registry.get(&self.plugin_id)?;
        let result = self.run(plugin.as_ref()).await;
        match &result {
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    kind = err.code(),
                    context = %err,
                    "task failed"
                );
            }
        }
        result
    }

    async fn run(&self, plugin: &dyn ErasedPlugin) -> Result<Value, OracleError> {
        // Phase 1: prepare, locally then across the cluster.
        let my_prepared = match plugin.prepare(self.input.clone()).await {
            Ok(prepared) => prepared,
            Err(OracleError::Permanent(context)) => {
                // Permanent rejects are idempotent; dragging peers into them
                // buys nothing.
                tracing::warn!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    kind = "permanent_error",
                    context = %context,
                    "prepare rejected input permanently; completing vacuously"
                );
                return Ok(Value::Null);
            }
            Err(OracleError::NonError(context)) => {
                tracing::info!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    context = %context,
                    "nothing to do"
                );
                return Ok(Value::Null);
            }
            Err(err) => return Err(err),
        };

        let records = self.collect_prepares(my_prepared.clone()).await;
        let required = self.context.min_signatures_required;
        if records.len() < required as usize {
            return Err(OracleError::InsufficientPeers {
                collected: records.len(),
                required,
            });
        }

        // Phase 2: aggregate on the primary.
        let process_input: Vec<PeerPrepared<Value>> = records
            .iter()
            .map(|record| PeerPrepared {
                public_key_hex: record.peer_public_key.clone(),
                prepared: record.prepared.clone(),
            })
            .collect();
        let aggregated = match plugin.process(process_input).await {
            Ok(aggregated) => aggregated,
            Err(OracleError::NonError(context)) => {
                tracing::info!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    context = %context,
                    "already processed upstream"
                );
                return Ok(Value::Null);
            }
            Err(err) => return Err(err),
        };

        // Phase 3: serial validation, primary first, then each contributing
        // peer in configuration order.
        let mut current = match plugin.validate(aggregated, my_prepared).await {
            Ok(validated) => validated,
            Err(OracleError::NonError(context)) => {
                tracing::info!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    context = %context,
                    "nothing left to validate"
                );
                return Ok(Value::Null);
            }
            Err(err) => return Err(err),
        };
        for peer in self.contributing_peers(&records) {
            let record = match records
                .iter()
                .find(|r| r.peer_public_key == peer.public_key)
            {
                Some(record) => record,
                None => continue,
            };
            let encoded_prepared = codec::encode(&record.prepared);
            let request = ValidateRequest {
                plugin_id: self.plugin_id.clone(),
                input: current,
                prepared_data: record.prepared.clone(),
                signature: self.context.keys.sign(&encoded_prepared).to_vec(),
            };
            current = self.context.transport.validate(peer, &request).await?;
        }

        // Phase 4: execute on the primary, at most once.
        let output = match plugin.execute(current).await {
            Ok(output) => output,
            Err(OracleError::DuplicateSubmission) => {
                tracing::info!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    "downstream already holds this submission"
                );
                Value::Null
            }
            Err(OracleError::NonError(context)) => {
                tracing::info!(
                    target: "protocol",
                    plugin_id = %self.plugin_id,
                    context = %context,
                    "nothing to execute"
                );
                return Ok(Value::Null);
            }
            Err(err) => return Err(err),
        };

        let elapsed = self.started_at.elapsed().as_secs_f64();
        attestor_telemetry::metrics::observe_task_completed(&self.plugin_id, elapsed);
        tracing::info!(
            target: "protocol",
            plugin_id = %self.plugin_id,
            elapsed_s = elapsed,
            "task completed"
        );
        Ok(output)
    }

    /// Fans the prepare out to every peer and collects whatever arrives
    /// before the deadline. The local record is always first; peer records
    /// follow in arrival order, at most one per public key.
    async fn collect_prepares(&self, my_prepared: Value) -> Vec<PeerPrepareRecord> {
        let mut records = vec![PeerPrepareRecord::local(
            self.context.keys.public_key_hex(),
            my_prepared,
        )];

        // A zero deadline means no peer contribution is ever accepted, so
        // don't bother dialing anyone.
        if self.context.peers.is_empty() || self.context.peer_timeout.is_zero() {
            return records;
        }

        let mut join_set = JoinSet::new();
        for peer in self.context.peers.clone() {
            let transport = Arc::clone(&self.context.transport);
            let plugin_id = self.plugin_id.clone();
            let input = self.input.clone();
            join_set.spawn(async move {
                let result = transport.prepare(&peer, &plugin_id, &input).await;
                (peer, result)
            });
        }

        let deadline = tokio::time::sleep(self.context.peer_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(
                        target: "protocol",
                        plugin_id = %self.plugin_id,
                        pending = join_set.len(),
                        "prepare deadline reached; abandoning outstanding peers"
                    );
                    break;
                }
                next = join_set.join_next() => match next {
                    None => break,
                    Some(Ok((peer, Ok(contribution)))) => {
                        if records
                            .iter()
                            .any(|r| r.peer_public_key == peer.public_key)
                        {
                            tracing::warn!(
                                target: "protocol",
                                peer = %peer.id,
                                "ignoring second prepare for the same public key"
                            );
                            continue;
                        }
                        records.push(PeerPrepareRecord {
                            peer_public_key: peer.public_key.clone(),
                            prepared: contribution.prepared,
                            encoded_data_hex: hex::encode(&contribution.encoded),
                            signature_hex: Some(hex::encode(&contribution.signature)),
                        });
                    }
                    Some(Ok((peer, Err(err)))) => {
                        tracing::warn!(
                            target: "protocol",
                            peer = %peer.id,
                            kind = err.code(),
                            context = %err,
                            "peer prepare failed"
                        );
                    }
                    Some(Err(join_err)) => {
                        tracing::warn!(
                            target: "protocol",
                            error = %join_err,
                            "peer prepare fiber aborted"
                        );
                    }
                }
            }
        }
        // Anything still in flight is abandoned; a late reply is dropped
        // without touching the task.
        join_set.abort_all();
        records
    }

    /// The peers that contributed a prepare, in configuration order.
    fn contributing_peers<'a>(
        &'a self,
        records: &'a [PeerPrepareRecord],
    ) -> impl Iterator<Item = &'a PeerConfig> {
        self.context.peers.iter().filter(move |peer| {
            records
                .iter()
                .any(|record| record.peer_public_key == peer.public_key)
        })
    }
}
