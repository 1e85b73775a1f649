//! Log output for test binaries.
//!
//! pierce reports resolution stages and polling at `trace`/`debug`, picked
//! options at `info`, and timeouts at `warn`. Call [`init_tracing`] at the top
//! of a test to see them:
//!
//! ```bash
//! PIERCE_LOG=pierce=debug cargo test -- --nocapture
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var holding the filter directives (falls back to `RUST_LOG`)
pub const LOG_ENV: &str = "PIERCE_LOG";

/// Default filter when neither variable is set
pub const DEFAULT_FILTER: &str = "pierce=info";

/// Build the filter from `PIERCE_LOG`, then `RUST_LOG`, then [`DEFAULT_FILTER`]
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a compact subscriber writing through the test harness.
///
/// Safe to call from every test: only the first call installs anything.
/// Returns whether this call installed the subscriber.
pub fn init_tracing() -> bool {
    let fmt_layer = fmt::layer()
        .with_test_writer()
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_tracing();
        assert!(!init_tracing());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
