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

//! # Attestor Telemetry
//!
//! Structured logging, Prometheus metric sinks, and the standalone
//! `/metrics` HTTP server. Metrics are registered once by
//! [`metrics::install`]; until then every sink helper is a no-op, which keeps
//! unit tests free of global registry setup.

/// The `/metrics` HTTP server.
pub mod http;
/// Tracing subscriber initialization.
pub mod init;
/// Prometheus metric registration and sink helpers.
pub mod metrics;

pub use init::init_tracing;
