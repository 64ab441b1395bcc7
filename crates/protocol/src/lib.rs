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

//! # Attestor Protocol
//!
//! The four-phase coordination protocol that binds a primary node to its
//! peers: Prepare (local + parallel peer fan-out under a deadline), Process
//! (primary-only aggregation), Validate (serial signature chaining across
//! peers), Execute (primary-only submission). Also home to the cross-cutting
//! machinery the protocol depends on: the peer transport seam and its HTTP
//! implementation, the keyed rate limiter, the retry combinator, and the
//! abstraction-chain client.

/// The downstream abstraction-chain client.
pub mod chain;
/// The HTTP peer transport implementation.
pub mod client;
/// The single retry combinator used by every ad-hoc retry site.
pub mod retry;
/// The four-phase task coordinator.
pub mod task;
/// The keyed moving-window rate limiter.
pub mod throttle;
/// The peer transport seam.
pub mod transport;

pub use task::{Task, TaskContext};
pub use transport::{PeerTransport, PreparedContribution};
