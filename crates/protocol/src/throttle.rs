//! The keyed moving-window rate limiter.
//!
//! Every source-chain RPC call runs through [`Throttle::run`], keyed by the
//! source name. Each key owns a moving one-second window of call timestamps;
//! callers that would overflow the window queue and sleep until the oldest
//! call ages out. Nothing is ever dropped: the queue is process memory,
//! bounded only by the application's own concurrency.
//!
//! Providers that answer HTTP 429 can be wrapped with
//! [`Throttle::retry_on_429`], which halves the key's effective rate for a
//! penalty window and retries once with the shared backoff policy.

use crate::retry::{retry, RetryPolicy};
use attestor_types::error::{ErrorCode, OracleError};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);
const PENALTY_WINDOW: Duration = Duration::from_secs(10);

struct BucketState {
    stamps: VecDeque<Instant>,
    penalty_until: Option<Instant>,
}

struct Bucket {
    state: Mutex<BucketState>,
    queued: AtomicI64,
}

impl Bucket {
    fn new() -> Self {
        Self {
            state: Mutex::new(BucketState {
                stamps: VecDeque::new(),
                penalty_until: None,
            }),
            queued: AtomicI64::new(0),
        }
    }
}

/// A per-key moving-window rate limiter.
#[derive(Default)]
pub struct Throttle {
    buckets: DashMap<String, Arc<Bucket>>,
}

impl Throttle {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, key: &str) -> Arc<Bucket> {
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Bucket::new()))
            .clone()
    }

    /// Runs `op` once a slot is free in `key`'s window.
    ///
    /// Errors from `op` propagate unchanged; the limiter itself only ever
    /// delays.
    pub async fn run<T, F, Fut>(
        &self,
        key: &str,
        limit: u32,
        op: F,
    ) -> Result<T, OracleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        self.acquire(key, limit).await;
        op().await
    }

    /// Like [`Throttle::run`], but retries once when the provider answers
    /// with a rate-limit rejection, after backing off and halving the key's
    /// effective rate for a penalty window.
    pub async fn retry_on_429<T, F, Fut>(
        &self,
        key: &str,
        limit: u32,
        op: F,
    ) -> Result<T, OracleError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, OracleError>>,
    {
        let policy = RetryPolicy::provider_backoff();
        let mut attempted = false;
        retry(policy, is_rate_limited, || {
            if attempted {
                self.penalize(key);
            }
            attempted = true;
            self.run(key, limit, &op)
        })
        .await
    }

    /// Marks a key as penalized, halving its effective rate for a while.
    pub fn penalize(&self, key: &str) {
        let bucket = self.bucket(key);
        // try_lock: penalizing is advisory; a contended lock means the state
        // is being updated anyway.
        if let Ok(mut state) = bucket.state.try_lock() {
            state.penalty_until = Some(Instant::now() + PENALTY_WINDOW);
            tracing::warn!(target: "throttle", key, "provider rate limit hit; halving effective rate");
        };
    }

    /// Current queue depth for a key, for tests and diagnostics.
    pub fn queue_depth(&self, key: &str) -> i64 {
        self.buckets
            .get(key)
            .map(|b| b.queued.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    async fn acquire(&self, key: &str, limit: u32) {
        let bucket = self.bucket(key);
        let started = Instant::now();
        bucket.queued.fetch_add(1, Ordering::Relaxed);
        attestor_telemetry::metrics::set_throttle_queue_depth(
            key,
            bucket.queued.load(Ordering::Relaxed),
        );
        loop {
            let wait = {
                let mut state = bucket.state.lock().await;
                let now = Instant::now();
                while state
                    .stamps
                    .front()
                    .is_some_and(|&stamp| now.duration_since(stamp) >= WINDOW)
                {
                    state.stamps.pop_front();
                }
                let effective = effective_limit(limit, &state, now);
                if (state.stamps.len() as u32) < effective {
                    state.stamps.push_back(now);
                    None
                } else {
                    state
                        .stamps
                        .front()
                        .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                }
            };
            match wait {
                None => break,
                // An empty window with a zero effective limit cannot happen
                // (effective is clamped to >= 1), so wait is always finite.
                Some(delay) => tokio::time::sleep(delay.max(Duration::from_millis(5))).await,
            }
        }
        bucket.queued.fetch_sub(1, Ordering::Relaxed);
        attestor_telemetry::metrics::set_throttle_queue_depth(
            key,
            bucket.queued.load(Ordering::Relaxed),
        );
        attestor_telemetry::metrics::observe_throttle_wait(
            key,
            started.elapsed().as_secs_f64(),
        );
    }
}

fn effective_limit(limit: u32, state: &BucketState, now: Instant) -> u32 {
    let penalized = state.penalty_until.is_some_and(|until| until > now);
    if penalized {
        (limit / 2).max(1)
    } else {
        limit.max(1)
    }
}

fn is_rate_limited(err: &OracleError) -> bool {
    err.code() == "throttle_error"
}
