//! The standalone `/metrics` HTTP server.
//!
//! Runs on its own port, separate from both the peer protocol and the
//! external API, so scrapers never contend with protocol traffic.

use axum::{
    body::Bytes,
    error_handling::HandleErrorLayer,
    http::{header::CONTENT_TYPE, HeaderName, StatusCode},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::{net::SocketAddr, time::Duration};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

async fn metrics_handler() -> ([(HeaderName, String); 1], Bytes) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(target: "telemetry", error = %e, "failed to encode prometheus metrics");
    }
    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buf.into(),
    )
}

async fn handle_service_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {err}"),
        )
    }
}

/// Builds the metrics router; exposed for tests.
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler)).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_service_error))
            .layer(TraceLayer::new_for_http())
            .load_shed()
            .concurrency_limit(8)
            .timeout(Duration::from_secs(2)),
    )
}

/// Binds and serves `/metrics` until the process exits.
pub async fn run_server(addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "telemetry", error = %e, "failed to bind metrics server");
            return;
        }
    };
    match listener.local_addr() {
        Ok(local) => tracing::info!(target: "telemetry", addr = %local, "metrics server listening"),
        Err(_) => tracing::info!(target: "telemetry", "metrics server listening"),
    }
    if let Err(e) = axum::serve(listener, router().into_make_service()).await {
        tracing::error!(target: "telemetry", error = %e, "metrics server error");
    }
}
