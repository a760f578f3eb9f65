//! Convergence waiter.
//!
//! Polls an observed state until a predicate holds, the overall deadline
//! passes, or the caller cancels. A failing poll aborts the wait immediately.

use crate::client::{KibanaError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;

/// Timings for waits on Fleet state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Overall deadline
    pub timeout: Duration,
    /// Delay between polls
    pub interval: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10 * 60),
            interval: Duration::from_secs(2),
        }
    }
}

impl WaitConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Poll `fetch` until `converged` accepts its result and return that result.
///
/// # Errors
/// - [`KibanaError::Cancelled`] as soon as `cancel` fires
/// - [`KibanaError::Timeout`] once `config.timeout` has elapsed
/// - the error of the first failing `fetch`
pub async fn wait_until<T, F, Fut, P>(
    operation: &str,
    config: &WaitConfig,
    cancel: &CancellationToken,
    mut fetch: F,
    mut converged: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> bool,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut ticker = interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cancelled = || KibanaError::Cancelled {
        operation: operation.to_string(),
    };
    let timed_out = || KibanaError::Timeout {
        operation: operation.to_string(),
        elapsed: start.elapsed(),
    };

    loop {
        let state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(deadline) => return Err(timed_out()),
            state = fetch() => state?,
        };

        if converged(&state) {
            log::debug!("{} converged after {:?}", operation, start.elapsed());
            return Ok(state);
        }
        log::debug!("{}: not converged yet, polling again", operation);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(deadline) => return Err(timed_out()),
            _ = ticker.tick() => {}
        }
    }
}
