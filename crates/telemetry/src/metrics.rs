//! Prometheus metric registration and sink helpers.
//!
//! All collectors live in `OnceCell` statics and are registered exactly once
//! by [`install`]. The sink helpers silently do nothing before `install` runs,
//! so library code can emit metrics unconditionally.

use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounterVec, IntGaugeVec,
};
use std::sync::Once;

static TASKS_COMPLETED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static TASK_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static THROTTLE_QUEUE_DEPTH: OnceCell<IntGaugeVec> = OnceCell::new();
static THROTTLE_WAIT_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static PEER_RPC_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static API_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static LISTENER_EVENTS_DISPATCHED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static LISTENER_ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static INSTALL: Once = Once::new();

/// Registers every collector with the default registry. Idempotent.
///
/// A registration failure here is a programming error (duplicate or invalid
/// collector), not a runtime condition, so this is the one place the crate
/// panics.
#[allow(clippy::expect_used)]
pub fn install() {
    INSTALL.call_once(|| {
        let _ = TASKS_COMPLETED_TOTAL.set(
            register_int_counter_vec!(
                "attestor_tasks_completed_total",
                "Tasks that reached a successful terminal state",
                &["plugin_id"]
            )
            .expect("register attestor_tasks_completed_total"),
        );
        let _ = TASK_DURATION_SECONDS.set(
            register_histogram_vec!(
                "attestor_task_duration_seconds",
                "End-to-end duration of successful tasks (seconds)",
                &["plugin_id"],
                exponential_buckets(0.01, 2.0, 14).expect("buckets")
            )
            .expect("register attestor_task_duration_seconds"),
        );
        let _ = THROTTLE_QUEUE_DEPTH.set(
            register_int_gauge_vec!(
                "attestor_throttle_queue_depth",
                "Callers currently queued in the rate limiter, per key",
                &["key"]
            )
            .expect("register attestor_throttle_queue_depth"),
        );
        let _ = THROTTLE_WAIT_SECONDS.set(
            register_histogram_vec!(
                "attestor_throttle_wait_seconds",
                "Time callers spent waiting for a rate-limit slot (seconds)",
                &["key"],
                exponential_buckets(0.001, 2.0, 15).expect("buckets")
            )
            .expect("register attestor_throttle_wait_seconds"),
        );
        let _ = PEER_RPC_TOTAL.set(
            register_int_counter_vec!(
                "attestor_peer_rpc_total",
                "Outbound peer RPCs by route and response status",
                &["route", "status"]
            )
            .expect("register attestor_peer_rpc_total"),
        );
        let _ = API_REQUESTS_TOTAL.set(
            register_int_counter_vec!(
                "attestor_api_requests_total",
                "External API requests by route and response status",
                &["route", "status"]
            )
            .expect("register attestor_api_requests_total"),
        );
        let _ = LISTENER_EVENTS_DISPATCHED_TOTAL.set(
            register_int_counter_vec!(
                "attestor_listener_events_dispatched_total",
                "Events dispatched into tasks, per listener",
                &["listener"]
            )
            .expect("register attestor_listener_events_dispatched_total"),
        );
        let _ = LISTENER_ERRORS_TOTAL.set(
            register_int_counter_vec!(
                "attestor_listener_errors_total",
                "Listener runs that ended in an error, per listener",
                &["listener"]
            )
            .expect("register attestor_listener_errors_total"),
        );
    });
}

/// Records a successful task and its duration.
pub fn observe_task_completed(plugin_id: &str, seconds: f64) {
    if let Some(counter) = TASKS_COMPLETED_TOTAL.get() {
        counter.with_label_values(&[plugin_id]).inc();
    }
    if let Some(histogram) = TASK_DURATION_SECONDS.get() {
        histogram.with_label_values(&[plugin_id]).observe(seconds);
    }
}

/// Publishes the current rate-limiter queue depth for a key.
pub fn set_throttle_queue_depth(key: &str, depth: i64) {
    if let Some(gauge) = THROTTLE_QUEUE_DEPTH.get() {
        gauge.with_label_values(&[key]).set(depth);
    }
}

/// Records how long a caller waited for a rate-limit slot.
pub fn observe_throttle_wait(key: &str, seconds: f64) {
    if let Some(histogram) = THROTTLE_WAIT_SECONDS.get() {
        histogram.with_label_values(&[key]).observe(seconds);
    }
}

/// Counts one outbound peer RPC.
pub fn inc_peer_rpc(route: &str, status: u16) {
    if let Some(counter) = PEER_RPC_TOTAL.get() {
        counter
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }
}

/// Counts one external API request.
pub fn inc_api_request(route: &str, status: u16) {
    if let Some(counter) = API_REQUESTS_TOTAL.get() {
        counter
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }
}

/// Counts events a listener dispatched into tasks.
pub fn inc_listener_events(listener: &str, count: u64) {
    if let Some(counter) = LISTENER_EVENTS_DISPATCHED_TOTAL.get() {
        counter.with_label_values(&[listener]).inc_by(count);
    }
}

/// Counts one failed listener run.
pub fn inc_listener_error(listener: &str) {
    if let Some(counter) = LISTENER_ERRORS_TOTAL.get() {
        counter.with_label_values(&[listener]).inc();
    }
}
