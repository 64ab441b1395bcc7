//! Server bootstrap and request accounting shared by both routers.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;

/// Middleware recording one counter sample per request, labelled by path and
/// response status.
pub async fn request_metrics(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    attestor_telemetry::metrics::inc_api_request(&path, response.status().as_u16());
    response
}

/// Binds `addr` and serves `router` until the process exits.
pub async fn serve(router: Router, addr: SocketAddr, name: &'static str) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "gateway", server = name, error = %e, "failed to bind");
            return;
        }
    };
    match listener.local_addr() {
        Ok(local) => {
            tracing::info!(target: "gateway", server = name, addr = %local, "listening");
        }
        Err(_) => tracing::info!(target: "gateway", server = name, "listening"),
    }
    if let Err(e) = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(target: "gateway", server = name, error = %e, "server error");
    }
}
