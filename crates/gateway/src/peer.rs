//! The peer-protocol router: `/task/prepare` and `/task/validate`.
//!
//! Request bodies are canonical codec encodings. The content type on the
//! wire is `application/json` (wrong, but fixed by history), so handlers
//! read raw bytes and never consult the header. Replies are JSON with hex
//! fields.

use crate::AppError;
use attestor_api::registry::PluginRegistry;
use attestor_crypto::{NodeKeys, PublicKey};
use attestor_types::codec;
use attestor_types::model::{PrepareReply, PrepareRequest, ValidateReply, ValidateRequest};
use attestor_types::value::FromValue;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state of the peer router.
pub struct PeerState {
    /// The process-wide plugin registry.
    pub registry: Arc<PluginRegistry>,
    /// The local key pair, used to sign prepare replies.
    pub keys: NodeKeys,
    /// The cluster primary's public key; every `/task/validate` signature
    /// must verify under it.
    pub primary_public: PublicKey,
}

/// Builds the peer router.
pub fn router(state: Arc<PeerState>) -> Router {
    Router::new()
        .route("/task/prepare", post(prepare_handler))
        .route("/task/validate", post(validate_handler))
        .with_state(state)
        .layer(middleware::from_fn(crate::cors::cors_middleware))
        .layer(middleware::from_fn(crate::serve::request_metrics))
        .layer(TraceLayer::new_for_http())
}

fn decode_body<T: FromValue>(body: &[u8]) -> Result<T, AppError> {
    let value = codec::decode(body).map_err(|e| AppError::bad_request(e.to_string()))?;
    T::from_value(value).map_err(|e| AppError::bad_request(e.to_string()))
}

async fn prepare_handler(
    State(state): State<Arc<PeerState>>,
    body: Bytes,
) -> Result<Json<PrepareReply>, AppError> {
    let request: PrepareRequest = decode_body(&body)?;
    let plugin = state.registry.get(&request.plugin_id)?;
    let prepared = plugin.prepare(request.input).await?;
    let encoded = codec::encode(&prepared);
    let signature = state.keys.sign(&encoded);
    tracing::debug!(
        target: "gateway",
        plugin_id = %request.plugin_id,
        encoded_len = encoded.len(),
        "served peer prepare"
    );
    Ok(Json(PrepareReply {
        encoded_data: hex::encode(encoded),
        signature: hex::encode(signature),
    }))
}

async fn validate_handler(
    State(state): State<Arc<PeerState>>,
    body: Bytes,
) -> Result<Json<ValidateReply>, AppError> {
    let request: ValidateRequest = decode_body(&body)?;

    // The signature gate runs before any plugin code: the request must carry
    // the primary's signature over the canonical encoding of the prepared
    // data this node contributed.
    let encoded_prepared = codec::encode(&request.prepared_data);
    if !attestor_crypto::verify(&encoded_prepared, &request.signature, &state.primary_public) {
        tracing::warn!(
            target: "gateway",
            plugin_id = %request.plugin_id,
            "rejected validate request with unverifiable signature"
        );
        return Err(AppError::invalid_signature());
    }

    let plugin = state.registry.get(&request.plugin_id)?;
    let updated = plugin
        .validate(request.input, request.prepared_data)
        .await?;
    Ok(Json(ValidateReply {
        encoded_data: hex::encode(codec::encode(&updated)),
    }))
}
