//! The listener contract consumed by the scheduler.

use async_trait::async_trait;
use attestor_types::error::OracleError;

/// A source observer that dispatches tasks and self-schedules.
///
/// `run` does a bounded amount of work (one scan window) and returns the
/// absolute unix-millisecond timestamp at which it wants to run next. A
/// caught-up listener throttles itself by returning a point in the future; a
/// backlogged one returns "now". The scheduler never cancels a running
/// listener and reschedules an erroring one a minute out.
///
/// Listeners must be idempotent with respect to their own progress marker:
/// replaying a window must not dispatch an event twice.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Unique listener id, used for tuning lookup and metric labels.
    fn id(&self) -> &str;

    /// Performs one bounded unit of work and returns the next fire time.
    async fn run(&self) -> Result<u64, OracleError>;
}
