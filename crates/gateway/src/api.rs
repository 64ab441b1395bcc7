//! The external API router: `/health`, `/sources`, `/task`,
//! `/helius/webhook`.

use crate::AppError;
use attestor_api::cache::SharedCache;
use attestor_protocol::{Task, TaskContext};
use attestor_types::config::HeliusWebhookConfig;
use attestor_types::value::Value;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// TTL for webhook burst deduplication: one on-chain event fans out into
/// many provider notifications within seconds.
const WEBHOOK_DEDUP_TTL: Duration = Duration::from_secs(30);

/// Cache key of the allow-list entry for a tracked token mint.
///
/// The balance plugin maintains these entries from the abstraction chain's
/// tracked-asset table; the webhook only dispatches for mints present here.
pub fn tracked_mint_key(mint: &str) -> String {
    format!("tracked-mint:{mint}")
}

/// Shared state of the API router.
pub struct ApiState {
    /// Handles tasks run against.
    pub context: Arc<TaskContext>,
    /// Configured source-chain names, served by `/sources`.
    pub sources: Vec<String>,
    /// The shared short-TTL cache (webhook dedup, mint allow-list).
    pub cache: Arc<SharedCache>,
    /// Helius webhook credentials, when the integration is enabled.
    pub helius: Option<HeliusWebhookConfig>,
    /// Plugin dispatched for webhook balance deltas.
    pub webhook_plugin_id: String,
}

/// Builds the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sources", get(sources_handler))
        .route("/task", post(task_handler))
        .route("/helius/webhook", post(helius_webhook_handler))
        .with_state(state)
        .layer(middleware::from_fn(crate::cors::cors_middleware))
        .layer(middleware::from_fn(crate::serve::request_metrics))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "OK" }))
}

async fn sources_handler(State(state): State<Arc<ApiState>>) -> Json<Vec<String>> {
    Json(state.sources.clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskSubmission {
    plugin_id: String,
    input: serde_json::Value,
}

/// Runs a task synchronously for a direct API submission.
async fn task_handler(
    State(state): State<Arc<ApiState>>,
    Json(submission): Json<TaskSubmission>,
) -> Result<&'static str, AppError> {
    let input = Value::from_json(&submission.input)
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    let task = Task::new(Arc::clone(&state.context), submission.plugin_id, input);
    task.start().await?;
    Ok("OK")
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TokenTransfer {
    #[serde(default)]
    mint: String,
    #[serde(default)]
    from_user_account: Option<String>,
    #[serde(default)]
    to_user_account: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct HeliusEvent {
    #[serde(default)]
    token_transfers: Vec<TokenTransfer>,
}

/// Accepts Helius token-balance notifications.
///
/// Auth is a shared secret compared against the `Authorization` header, the
/// one accepted header name. Deltas are filtered against the cached mint
/// allow-list, deduplicated per `(mint, account)` in the short-TTL cache, and
/// dispatched as one background task per distinct pair.
async fn helius_webhook_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(events): Json<Vec<HeliusEvent>>,
) -> Result<&'static str, AppError> {
    let Some(config) = &state.helius else {
        return Err(AppError::unauthorized("webhook is not configured"));
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if presented != config.api_key {
        return Err(AppError::unauthorized("bad webhook secret"));
    }

    let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for event in &events {
        for transfer in &event.token_transfers {
            if transfer.mint.is_empty() {
                continue;
            }
            if !state.cache.contains(&tracked_mint_key(&transfer.mint)) {
                continue;
            }
            for account in [&transfer.from_user_account, &transfer.to_user_account]
                .into_iter()
                .flatten()
            {
                pairs.insert((transfer.mint.clone(), account.clone()));
            }
        }
    }

    let mut dispatched = 0u64;
    for (mint, account) in pairs {
        let dedup_key = format!("webhook:{mint}:{account}");
        if state.cache.contains(&dedup_key) {
            continue;
        }
        state
            .cache
            .insert(dedup_key, Value::Bool(true), WEBHOOK_DEDUP_TTL);
        let input = Value::map([
            ("mint", Value::Text(mint)),
            ("account", Value::Text(account)),
        ]);
        let context = Arc::clone(&state.context);
        let plugin_id = state.webhook_plugin_id.clone();
        // Webhook providers expect a fast ack; the task runs in the
        // background and reports through logs and metrics.
        tokio::spawn(async move {
            let _ = Task::new(context, plugin_id, input).start().await;
        });
        dispatched += 1;
    }
    tracing::info!(target: "gateway", dispatched, "webhook accepted");
    Ok("OK")
}
