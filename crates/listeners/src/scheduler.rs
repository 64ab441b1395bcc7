//! The per-listener fiber scheduler.
//!
//! Every registered listener gets one dedicated fiber that owns its schedule
//! entry outright; there is no shared lock across listeners. A fiber wakes
//! roughly every 100 ms, and when its listener is due it runs it and adopts
//! whatever next-fire timestamp the run returned. An error reschedules one
//! minute out. Listeners are never cancelled; fibers run until process exit.

use attestor_api::listener::Listener;
use attestor_types::time::now_ms;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Schedule state owned by exactly one fiber.
struct ScheduleEntry {
    listener: Arc<dyn Listener>,
    next_fire_at: Instant,
    running: bool,
}

/// Registers listeners and spawns one fiber per entry.
#[derive(Default)]
pub struct Scheduler {
    pending: Mutex<Vec<Arc<dyn Listener>>>,
    started: AtomicBool,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; only valid before [`Scheduler::start`].
    pub fn register(&self, listener: Arc<dyn Listener>) {
        if self.started.load(Ordering::SeqCst) {
            tracing::warn!(
                target: "scheduler",
                listener = listener.id(),
                "registration after start is ignored"
            );
            return;
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(listener);
        }
    }

    /// Spawns the fibers. Calling twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            tracing::info!(target: "scheduler", listener = listener.id(), "starting listener fiber");
            tokio::spawn(drive(ScheduleEntry {
                listener,
                next_fire_at: Instant::now(),
                running: false,
            }));
        }
    }
}

/// Converts a listener-returned absolute unix-ms timestamp into a monotonic
/// deadline for the fiber's clock.
fn deadline_from_unix_ms(next_unix_ms: u64) -> Instant {
    let delta_ms = next_unix_ms.saturating_sub(now_ms());
    Instant::now() + Duration::from_millis(delta_ms)
}

async fn drive(mut entry: ScheduleEntry) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        if entry.running || Instant::now() < entry.next_fire_at {
            continue;
        }
        entry.running = true;
        let id = entry.listener.id().to_string();
        match entry.listener.run().await {
            Ok(next_unix_ms) => {
                entry.next_fire_at = deadline_from_unix_ms(next_unix_ms);
            }
            Err(err) => {
                attestor_telemetry::metrics::inc_listener_error(&id);
                tracing::error!(
                    target: "scheduler",
                    listener = %id,
                    error = %err,
                    "listener run failed; backing off one minute"
                );
                entry.next_fire_at = Instant::now() + ERROR_BACKOFF;
            }
        }
        entry.running = false;
    }
}
