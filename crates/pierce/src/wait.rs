//! Bounded polling waits.
//!
//! [`Waiter::wait_until`] evaluates an async probe immediately, then once per
//! poll interval until it reports ready or the timeout elapses. Sleeping goes
//! through the injected [`Clock`], and every sleep races the session's
//! cancellation token, so an aborted test stops polling at once.
//!
//! Guarantees, for a probe that costs no time:
//!
//! - ready at time `t` → at most `ceil(t / interval) + 1` evaluations
//! - never ready → fails no earlier than `timeout`, no later than
//!   `timeout + interval` (the last sleep is clamped to the remaining time)

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::clock::Clock;
use crate::result::{PierceError, PierceResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for element waits (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval for element waits (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default polling interval for search-select option waits (250ms)
pub const DEFAULT_SEARCH_POLL_INTERVAL_MS: u64 = 250;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults used by search-select
    #[must_use]
    pub const fn search() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_SEARCH_POLL_INTERVAL_MS,
        }
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject options that would busy-loop
    pub fn validate(&self) -> PierceResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(PierceError::Config {
                message: "poll interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// PROBES AND OUTCOMES
// =============================================================================

/// One evaluation of a wait predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Condition met, carrying whatever the caller needs next
    Ready(T),
    /// Not yet; the string describes what was observed
    Pending(String),
}

impl Probe<()> {
    /// Probe from a plain boolean
    pub fn from_bool(ready: bool, state: impl Into<String>) -> Self {
        if ready {
            Self::Ready(())
        } else {
            Self::Pending(state.into())
        }
    }
}

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome<T> {
    /// Value produced by the ready probe
    pub value: T,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of probe evaluations
    pub attempts: u32,
}

// =============================================================================
// WAITER
// =============================================================================

/// Polls probes against a clock, honouring cancellation
#[derive(Debug, Clone)]
pub struct Waiter {
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl Waiter {
    /// Create a waiter
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        Self { clock, cancel }
    }

    /// Clock used for timing and sleeping
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Wait until `probe` reports ready.
    ///
    /// Errors from the probe are returned immediately; only
    /// [`Probe::Pending`] is retried.
    ///
    /// # Errors
    ///
    /// [`PierceError::Timeout`] with the last pending state,
    /// [`PierceError::Cancelled`] if the token fires,
    /// [`PierceError::Config`] for a zero poll interval.
    pub async fn wait_until<T, F, Fut>(
        &self,
        waited_for: &str,
        options: &WaitOptions,
        mut probe: F,
    ) -> PierceResult<WaitOutcome<T>>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = PierceResult<Probe<T>>> + Send,
        T: Send,
    {
        options.validate()?;

        let start = self.clock.now();
        let timeout = options.timeout();
        let interval = options.poll_interval();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(waited_for, start));
            }

            attempts += 1;
            let state = match probe().await? {
                Probe::Ready(value) => {
                    let elapsed = self.elapsed_since(start);
                    trace!(waited_for, attempts, elapsed_ms = as_ms(elapsed), "wait satisfied");
                    return Ok(WaitOutcome {
                        value,
                        elapsed,
                        attempts,
                    });
                }
                Probe::Pending(state) => state,
            };

            let elapsed = self.elapsed_since(start);
            if elapsed >= timeout {
                warn!(
                    waited_for,
                    attempts,
                    elapsed_ms = as_ms(elapsed),
                    last_state = %state,
                    "wait timed out"
                );
                return Err(PierceError::Timeout {
                    waited_for: waited_for.to_string(),
                    elapsed_ms: as_ms(elapsed),
                    attempts,
                    last_state: state,
                });
            }

            let nap = interval.min(timeout - elapsed);
            trace!(waited_for, attempts, nap_ms = as_ms(nap), state = %state, "still pending");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(self.cancelled(waited_for, start));
                }
                () = self.clock.sleep(nap) => {}
            }
        }
    }

    fn elapsed_since(&self, start: Duration) -> Duration {
        self.clock.now().saturating_sub(start)
    }

    fn cancelled(&self, waited_for: &str, start: Duration) -> PierceError {
        let elapsed_ms = as_ms(self.elapsed_since(start));
        warn!(waited_for, elapsed_ms, "wait cancelled");
        PierceError::Cancelled {
            waited_for: waited_for.to_string(),
            elapsed_ms,
        }
    }
}

fn as_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

// =============================================================================
// TESTS
// =============================================================================
