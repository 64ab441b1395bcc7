//! The four-phase plugin contract.
//!
//! A plugin is driven through Prepare → Process → Validate → Execute by the
//! task coordinator. The typed [`Plugin`] trait is what plugin authors
//! implement; the object-safe [`ErasedPlugin`] mirror operates on the
//! canonical [`Value`] grammar and is what the coordinator and the peer
//! server dispatch through, so the two sides never need the concrete types.
//!
//! Determinism contract the coordinator relies on:
//! - two honest nodes receiving the same input must produce preparations
//!   whose canonical encodings are identical;
//! - `process` must be idempotent modulo signer-set ordering; the downstream
//!   chain deduplicates equal transactions;
//! - `validate` appends signatures to the aggregate, never replaces them.

use async_trait::async_trait;
use attestor_types::error::OracleError;
use attestor_types::value::{FromValue, ToValue, Value};

/// One peer's preparation, as handed to `process`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPrepared<P> {
    /// Hex of the contributing node's compressed public key.
    pub public_key_hex: String,
    /// The contributed preparation.
    pub prepared: P,
}

impl<P> PeerPrepared<P> {
    /// Maps the prepared payload, keeping the contributor key.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> PeerPrepared<Q> {
        PeerPrepared {
            public_key_hex: self.public_key_hex,
            prepared: f(self.prepared),
        }
    }
}

/// A polymorphic oracle plugin.
///
/// All four associated types round-trip through the canonical value grammar;
/// that is what lets preparations travel between nodes and lets signatures be
/// computed over a unique byte string.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// The task input, as dispatched by a listener or the external API.
    type Input: ToValue + FromValue + Send + Sync;
    /// The per-node preparation produced in phase one.
    type Prepared: ToValue + FromValue + Send + Sync;
    /// The aggregated artifact carried through validate and execute.
    type Aggregated: ToValue + FromValue + Send + Sync;
    /// The terminal output of a successful execution.
    type Output: ToValue + FromValue + Send + Sync;

    /// The unique plugin id used for registry lookups and metric labels.
    fn id(&self) -> &str;

    /// Phase one: derive a preparation from the input.
    ///
    /// Read-only with respect to external systems; honest nodes must produce
    /// equivalent preparations for the same input.
    async fn prepare(&self, input: &Self::Input) -> Result<Self::Prepared, OracleError>;

    /// Phase two (primary only): combine the collected preparations into a
    /// single artifact, typically a transaction body with a signer list.
    async fn process(
        &self,
        prepared: &[PeerPrepared<Self::Prepared>],
    ) -> Result<Self::Aggregated, OracleError>;

    /// Phase three: re-examine the aggregate against this node's own
    /// preparation and return it with this node's signature appended.
    async fn validate(
        &self,
        aggregated: Self::Aggregated,
        my_prepared: &Self::Prepared,
    ) -> Result<Self::Aggregated, OracleError>;

    /// Phase four (primary only): submit the final artifact downstream.
    async fn execute(&self, aggregated: Self::Aggregated) -> Result<Self::Output, OracleError>;
}

/// Object-safe mirror of [`Plugin`] over the canonical value grammar.
///
/// Implemented for every [`Plugin`] by the blanket impl below; stored as
/// `Arc<dyn ErasedPlugin>` in the registry.
#[async_trait]
pub trait ErasedPlugin: Send + Sync {
    /// The unique plugin id.
    fn id(&self) -> &str;
    /// Typed `prepare` bridged through the value grammar.
    async fn prepare(&self, input: Value) -> Result<Value, OracleError>;
    /// Typed `process` bridged through the value grammar.
    async fn process(&self, prepared: Vec<PeerPrepared<Value>>) -> Result<Value, OracleError>;
    /// Typed `validate` bridged through the value grammar.
    async fn validate(&self, aggregated: Value, my_prepared: Value) -> Result<Value, OracleError>;
    /// Typed `execute` bridged through the value grammar.
    async fn execute(&self, aggregated: Value) -> Result<Value, OracleError>;
}

#[async_trait]
impl<P: Plugin> ErasedPlugin for P {
    fn id(&self) -> &str {
        Plugin::id(self)
    }

    async fn prepare(&self, input: Value) -> Result<Value, OracleError> {
        let input = P::Input::from_value(input)?;
        Ok(Plugin::prepare(self, &input).await?.to_value())
    }

    async fn process(&self, prepared: Vec<PeerPrepared<Value>>) -> Result<Value, OracleError> {
        let mut typed = Vec::with_capacity(prepared.len());
        for record in prepared {
            let value = P::Prepared::from_value(record.prepared)?;
            typed.push(PeerPrepared {
                public_key_hex: record.public_key_hex,
                prepared: value,
            });
        }
        Ok(Plugin::process(self, &typed).await?.to_value())
    }

    async fn validate(&self, aggregated: Value, my_prepared: Value) -> Result<Value, OracleError> {
        let aggregated = P::Aggregated::from_value(aggregated)?;
        let my_prepared = P::Prepared::from_value(my_prepared)?;
        Ok(Plugin::validate(self, aggregated, &my_prepared)
            .await?
            .to_value())
    }

    async fn execute(&self, aggregated: Value) -> Result<Value, OracleError> {
        let aggregated = P::Aggregated::from_value(aggregated)?;
        Ok(Plugin::execute(self, aggregated).await?.to_value())
    }
}
