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

//! # Attestor API
//!
//! Core traits and interfaces for the Attestor oracle network. This crate
//! defines the stable contract between the task coordinator, the plugins it
//! drives, and the listeners that feed it, without depending on any of their
//! implementations.

/// The shared TTL key-value cache.
pub mod cache;
/// The listener contract consumed by the scheduler.
pub mod listener;
/// The four-phase plugin contract, typed and erased.
pub mod plugin;
/// The process-wide plugin registry.
pub mod registry;
/// Source-chain adapter interfaces (external collaborators).
pub mod source;

/// A curated set of the most commonly used traits and types.
pub mod prelude {
    pub use crate::cache::{SharedCache, TtlCache};
    pub use crate::listener::Listener;
    pub use crate::plugin::{ErasedPlugin, PeerPrepared, Plugin};
    pub use crate::registry::PluginRegistry;
    pub use crate::source::{EvmLog, EvmSource, SolanaSignature, SolanaSource};
}
