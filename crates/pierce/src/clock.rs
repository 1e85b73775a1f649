//! Injectable time source for waits.
//!
//! [`SystemClock`] sleeps on the tokio timer. [`FakeClock`] keeps virtual
//! time: sleeping advances it instantly and yields to the scheduler, so
//! polling logic can be tested without wall-clock delays.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic clock with cooperative sleep
#[async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by tokio
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for deterministic tests
#[derive(Debug, Default)]
pub struct FakeClock {
    /// Current virtual time in milliseconds
    current_ms: AtomicU64,
    /// Number of sleeps performed
    sleeps: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock at time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Move time forward without sleeping
    pub fn advance(&self, duration: Duration) {
        self.current_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// How many times `sleep` was called
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_starts_at_zero() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_fake_clock_advance() {
        let clock = FakeClock::new();
        clock.advance(Duration::from_millis(250));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 500);
    }

    #[tokio::test]
    async fn test_fake_clock_sleep_advances_virtual_time() {
        let clock = FakeClock::new();
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.now(), Duration::from_secs(5));
        assert_eq!(clock.sleep_count(), 1);
    }

    #[tokio::test]
    async fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() >= before + Duration::from_millis(5));
    }
}
