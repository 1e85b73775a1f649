//! Result and error types for pierce.

use thiserror::Error;

/// Result type for pierce operations
pub type PierceResult<T> = Result<T, PierceError>;

/// Coarse classification of a failed interaction.
///
/// Tests usually only care about which of these happened; the full
/// [`PierceError`] carries the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A selector matched nothing at resolution time
    NotFound,
    /// A wait exceeded its bound
    Timeout,
    /// The option list settled but no entry matched the filter
    NoMatch,
    /// The selector or option template could not be parsed
    InvalidSelector,
    /// A strict locator matched more than one element
    Ambiguous,
    /// The enclosing test cancelled the wait
    Cancelled,
    /// The browser driver reported a failure
    Driver,
    /// Invalid configuration
    Config,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotFound => "not-found",
            Self::Timeout => "timeout",
            Self::NoMatch => "no-match",
            Self::InvalidSelector => "invalid-selector",
            Self::Ambiguous => "ambiguous",
            Self::Cancelled => "cancelled",
            Self::Driver => "driver",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in pierce
#[derive(Debug, Error)]
pub enum PierceError {
    /// Selector could not be parsed
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector {
        /// Selector as written
        selector: String,
        /// What is wrong with it
        reason: String,
    },

    /// Selector matched nothing
    #[error("No element matches {selector:?} (stage {stage}: {stage_selector:?})")]
    NotFound {
        /// Full selector
        selector: String,
        /// Index of the stage that produced zero matches
        stage: usize,
        /// CSS of that stage
        stage_selector: String,
    },

    /// Strict locator matched several elements
    #[error("Selector {selector:?} matched {count} elements, expected exactly one")]
    Ambiguous {
        /// Full selector
        selector: String,
        /// Number of matches
        count: usize,
    },

    /// A bounded wait ran out of time
    #[error(
        "Timed out after {elapsed_ms}ms waiting for {waited_for} \
         ({attempts} attempts, last state: {last_state})"
    )]
    Timeout {
        /// What was waited for
        waited_for: String,
        /// Time spent waiting
        elapsed_ms: u64,
        /// Number of predicate evaluations
        attempts: u32,
        /// Last state reported by the predicate
        last_state: String,
    },

    /// Option list rendered, but nothing matched the filter
    #[error("No option matching {selector:?} with filter {filter:?} (saw: {seen:?})")]
    NoMatch {
        /// Option selector template
        selector: String,
        /// Filter text that was typed
        filter: String,
        /// Labels of the displayed candidates
        seen: Vec<String>,
    },

    /// Wait aborted by the enclosing test
    #[error("Cancelled after {elapsed_ms}ms while waiting for {waited_for}")]
    Cancelled {
        /// What was waited for
        waited_for: String,
        /// Time spent before cancellation
        elapsed_ms: u64,
    },

    /// Element handle no longer refers to a live element
    #[error("Stale element handle {id}")]
    StaleElement {
        /// Driver-issued handle id
        id: String,
    },

    /// Browser driver failure
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PierceError {
    /// Shorthand for a driver failure
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Shorthand for a selector parse failure
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidSelector { .. } => FailureKind::InvalidSelector,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Ambiguous { .. } => FailureKind::Ambiguous,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::NoMatch { .. } => FailureKind::NoMatch,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::StaleElement { .. } | Self::Driver { .. } => FailureKind::Driver,
            Self::Config { .. } | Self::Io(_) | Self::Yaml(_) => FailureKind::Config,
        }
    }

    /// True when the error means "the element is not there"
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
