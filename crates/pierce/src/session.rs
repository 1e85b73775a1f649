//! Per-test browser session: driver, clock, timing config, cancellation.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::PierceConfig;
use crate::driver::Driver;
use crate::locator::Locator;
use crate::wait::Waiter;

/// Everything a page object needs to talk to the browser.
///
/// Cheap to clone; clones share the driver, clock and cancellation token.
#[derive(Debug, Clone)]
pub struct Session {
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
    config: PierceConfig,
    cancel: CancellationToken,
}

impl Session {
    /// Session over `driver` with the system clock and default config
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            clock: Arc::new(SystemClock::new()),
            config: PierceConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the timing config
    #[must_use]
    pub const fn with_config(mut self, config: PierceConfig) -> Self {
        self.config = config;
        self
    }

    /// Tie waits to an externally owned token (e.g. the test harness's)
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The driver
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// The clock
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The timing config
    #[must_use]
    pub const fn config(&self) -> &PierceConfig {
        &self.config
    }

    /// Token that aborts every wait on this session
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort in-flight and future waits
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waiter bound to this session's clock and token
    #[must_use]
    pub fn waiter(&self) -> Waiter {
        Waiter::new(self.clock.clone(), self.cancel.clone())
    }

    /// Document-rooted locator
    #[must_use]
    pub fn locate(&self, selector: impl Into<String>) -> Locator {
        Locator::new(selector)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mock::{MockDom, MockDriver, NodeSpec};
    use crate::result::FailureKind;
    use crate::wait::{Probe, WaitOptions};
    use std::time::Duration;

    fn session() -> (Session, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let dom = MockDom::from_specs(vec![NodeSpec::new("main")]);
        let driver = Arc::new(MockDriver::new(dom, clock.clone()));
        (Session::new(driver).with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_waiter_uses_session_clock() {
        let (session, clock) = session();
        let options = WaitOptions::new().with_timeout(300).with_poll_interval(100);
        let err = session
            .waiter()
            .wait_until("never", &options, || async {
                Ok(Probe::<()>::Pending("no".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_cancel_is_shared_by_clones() {
        let (session, _) = session();
        let clone = session.clone();
        session.cancel();
        assert!(clone.cancellation_token().is_cancelled());
        let err = clone
            .waiter()
            .wait_until("anything", &WaitOptions::new(), || async {
                Ok(Probe::Ready(()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_locate_finds_document_elements() {
        let (session, _) = session();
        assert!(session.locate("main").exists(&session).await.unwrap());
    }

    #[test]
    fn test_with_config() {
        let (session, _) = session();
        let config = PierceConfig::default().with_search(WaitOptions::search().with_timeout(9));
        let session = session.with_config(config);
        assert_eq!(session.config().search.timeout_ms, 9);
    }
}
