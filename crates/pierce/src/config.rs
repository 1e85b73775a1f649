//! Session configuration: wait bounds for element waits and search-select.
//!
//! Layering, lowest first: built-in defaults, a YAML file, then
//! `PIERCE_*` environment variables.
//!
//! ```yaml
//! wait:
//!   timeout_ms: 10000
//!   poll_interval_ms: 100
//! search:
//!   timeout_ms: 5000
//!   poll_interval_ms: 250
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::result::{PierceError, PierceResult};
use crate::wait::WaitOptions;

/// Env var overriding `wait.timeout_ms`
pub const ENV_WAIT_TIMEOUT_MS: &str = "PIERCE_WAIT_TIMEOUT_MS";
/// Env var overriding `wait.poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "PIERCE_POLL_INTERVAL_MS";
/// Env var overriding `search.timeout_ms`
pub const ENV_SEARCH_TIMEOUT_MS: &str = "PIERCE_SEARCH_TIMEOUT_MS";
/// Env var overriding `search.poll_interval_ms`
pub const ENV_SEARCH_POLL_INTERVAL_MS: &str = "PIERCE_SEARCH_POLL_INTERVAL_MS";

/// Timing configuration shared by every locator and page on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PierceConfig {
    /// Bounds for `wait_for_*` locator waits
    pub wait: WaitOptions,
    /// Bounds for the option wait inside search-select
    #[serde(deserialize_with = "search_options")]
    pub search: WaitOptions,
}

/// A `wait`/`search` block as written; absent keys are `None`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialWait {
    timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl PartialWait {
    fn over(self, base: WaitOptions) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
        }
    }
}

/// Fill a partial `search:` block from the search-select defaults, not the
/// element-wait ones
fn search_options<'de, D: Deserializer<'de>>(deserializer: D) -> Result<WaitOptions, D::Error> {
    PartialWait::deserialize(deserializer).map(|partial| partial.over(WaitOptions::search()))
}

impl Default for PierceConfig {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            search: WaitOptions::search(),
        }
    }
}

impl PierceConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> PierceResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> PierceResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Apply `PIERCE_*` environment variables
    pub fn with_env_overrides(self) -> PierceResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PierceResult<Self> {
        let read = |key: &str| -> PierceResult<Option<u64>> {
            lookup(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|e| PierceError::Config {
                        message: format!("{key}={raw:?}: {e}"),
                    })
                })
                .transpose()
        };

        if let Some(ms) = read(ENV_WAIT_TIMEOUT_MS)? {
            self.wait.timeout_ms = ms;
        }
        if let Some(ms) = read(ENV_POLL_INTERVAL_MS)? {
            self.wait.poll_interval_ms = ms;
        }
        if let Some(ms) = read(ENV_SEARCH_TIMEOUT_MS)? {
            self.search.timeout_ms = ms;
        }
        if let Some(ms) = read(ENV_SEARCH_POLL_INTERVAL_MS)? {
            self.search.poll_interval_ms = ms;
        }
        self.validate()?;
        Ok(self)
    }

    /// Set the element wait bounds
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Set the search-select wait bounds
    #[must_use]
    pub const fn with_search(mut self, search: WaitOptions) -> Self {
        self.search = search;
        self
    }

    /// Reject zero poll intervals
    pub fn validate(&self) -> PierceResult<()> {
        self.wait.validate()?;
        self.search.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::FailureKind;
    use std::collections::HashMap;
    use std::io::Write;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = PierceConfig::default();
            assert_eq!(config.wait.timeout_ms, 5_000);
            assert_eq!(config.wait.poll_interval_ms, 50);
            assert_eq!(config.search.timeout_ms, 5_000);
            assert_eq!(config.search.poll_interval_ms, 250);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_builders() {
            let config = PierceConfig::new()
                .with_wait(WaitOptions::new().with_timeout(1_000))
                .with_search(WaitOptions::search().with_poll_interval(100));
            assert_eq!(config.wait.timeout_ms, 1_000);
            assert_eq!(config.search.poll_interval_ms, 100);
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let config = PierceConfig::from_yaml_str("search:\n  timeout_ms: 8000\n").unwrap();
            assert_eq!(config.search.timeout_ms, 8_000);
            assert_eq!(config.search.poll_interval_ms, 250);
            assert_eq!(config.wait, WaitOptions::default());
        }

        #[test]
        fn test_partial_search_interval_keeps_search_timeout() {
            let config =
                PierceConfig::from_yaml_str("search: {poll_interval_ms: 100}\n").unwrap();
            assert_eq!(config.search, WaitOptions::search().with_poll_interval(100));
        }

        #[test]
        fn test_partial_wait_keeps_wait_defaults() {
            let config = PierceConfig::from_yaml_str("wait:\n  timeout_ms: 8000\n").unwrap();
            assert_eq!(config.wait.poll_interval_ms, 50);
            assert_eq!(config.search, WaitOptions::search());
        }

        #[test]
        fn test_unknown_search_key_rejected() {
            let err = PierceConfig::from_yaml_str("search:\n  timeout: 8000\n").unwrap_err();
            assert!(matches!(err, PierceError::Yaml(_)));
        }

        #[test]
        fn test_zero_interval_rejected() {
            let err =
                PierceConfig::from_yaml_str("wait:\n  poll_interval_ms: 0\n").unwrap_err();
            assert_eq!(err.kind(), FailureKind::Config);
        }

        #[test]
        fn test_malformed_yaml() {
            let err = PierceConfig::from_yaml_str("wait: [1, 2").unwrap_err();
            assert!(matches!(err, PierceError::Yaml(_)));
        }

        #[test]
        fn test_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "wait:\n  timeout_ms: 250\n  poll_interval_ms: 25").unwrap();
            let config = PierceConfig::from_file(file.path()).unwrap();
            assert_eq!(config.wait.timeout_ms, 250);
            assert_eq!(config.wait.poll_interval_ms, 25);
        }

        #[test]
        fn test_missing_file_is_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = PierceConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
            assert!(matches!(err, PierceError::Io(_)));
        }
    }

    mod override_tests {
        use super::*;

        fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
            let map: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            move |key| map.get(key).cloned()
        }

        #[test]
        fn test_overrides_apply() {
            let config = PierceConfig::default()
                .with_overrides_from(lookup(&[
                    (ENV_WAIT_TIMEOUT_MS, "100"),
                    (ENV_SEARCH_POLL_INTERVAL_MS, " 50 "),
                ]))
                .unwrap();
            assert_eq!(config.wait.timeout_ms, 100);
            assert_eq!(config.wait.poll_interval_ms, 50);
            assert_eq!(config.search.poll_interval_ms, 50);
        }

        #[test]
        fn test_unparseable_override() {
            let err = PierceConfig::default()
                .with_overrides_from(lookup(&[(ENV_POLL_INTERVAL_MS, "fast")]))
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::Config);
            assert!(err.to_string().contains(ENV_POLL_INTERVAL_MS));
        }

        #[test]
        fn test_zero_interval_override_rejected() {
            let err = PierceConfig::default()
                .with_overrides_from(lookup(&[(ENV_SEARCH_POLL_INTERVAL_MS, "0")]))
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::Config);
        }
    }
}
