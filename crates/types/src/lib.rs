#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Attestor Types
//!
//! This crate is the foundational library for the Attestor oracle network,
//! containing the canonical value grammar and binary codec, all shared error
//! types, the static configuration model, and the wire-level data structures
//! exchanged between peers.
//!
//! ## Architectural Role
//!
//! As the base crate, `attestor-types` has minimal dependencies and is itself
//! a dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a single canonical definition
//! for the types the protocol signs over.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::OracleError> = std::result::Result<T, E>;

/// The deterministic, type-tagged binary codec used to canonicalize payloads.
pub mod codec;
/// Static configuration structures loaded once at startup.
pub mod config;
/// The unified error taxonomy used at every boundary.
pub mod error;
/// Wire-level and protocol-level data structures (`Peer`, prepare records, envelopes).
pub mod model;
/// Millisecond wall-clock helpers.
pub mod time;
/// The structured value grammar the codec operates on.
pub mod value;
