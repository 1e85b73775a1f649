//! Pierce: Page Objects for Shadow-DOM Heavy Web UIs
//!
//! Web-component admin interfaces put nearly every input inside a shadow
//! root, and fill their dropdowns asynchronously. Pierce gives UI tests three
//! things to cope with that:
//!
//! - **Piercing locators**: `ak-form >>> input[name="externalHost"]` finds the
//!   input inside the form's shadow root; a leading `>>>` searches every
//!   shadow root in the document, at any depth.
//! - **Bounded waits**: poll a condition at a fixed interval until it holds or
//!   a timeout passes, against an injectable clock.
//! - **Search-select**: type a filter into a searchable dropdown, wait for a
//!   matching option to render, click it.
//!
//! Page objects tie these together; `#[derive(Page)]` declares one from a
//! list of named selectors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  test code                                                      │
//! │     │                                                           │
//! │     ▼                                                           │
//! │  Page (trait, shared instances) ──► SearchSelect                │
//! │     │                                   │                       │
//! │     ▼                                   ▼                       │
//! │  Locator (selector stages) ◄────── Waiter (Clock, cancel)       │
//! │     │                                                           │
//! │     ▼                                                           │
//! │  Session ──► dyn Driver ──► CdpDriver (chromium) | MockDriver   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pierce::{Page, PierceResult, Session};
//!
//! #[derive(Debug, Default, Page)]
//! #[page(name = "forward-proxy-form")]
//! #[page(locator(external_host = ">>>input[name=\"externalHost\"]"))]
//! struct ForwardProxyForm;
//!
//! async fn fill(session: &Session) -> PierceResult<()> {
//!     let form = ForwardProxyForm::shared();
//!     form.external_host().set_value(session, "https://proxy.local").await?;
//!     form.search_select(
//!         session,
//!         "ak-flow-search[name=\"authorizationFlow\"]",
//!         "authorizationFlow",
//!         "button*=default-provider-authorization-explicit-consent",
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Chromium driver (Chrome DevTools Protocol)
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc)]
pub mod cdp;

mod clock;
mod config;
mod driver;
mod locator;
mod page;
mod result;
mod search_select;
mod selector;
mod session;
mod wait;

/// In-memory document and driver for testing page objects
pub mod mock;

/// Log output for test binaries
pub mod tracing_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    PierceConfig, ENV_POLL_INTERVAL_MS, ENV_SEARCH_POLL_INTERVAL_MS, ENV_SEARCH_TIMEOUT_MS,
    ENV_WAIT_TIMEOUT_MS,
};
pub use driver::{Driver, ElementHandle, SearchScope};
pub use locator::{resolve_selector, roots_of, Locator, LocatorOptions, Resolution};
pub use page::{registered_pages, shared, Page};
pub use result::{FailureKind, PierceError, PierceResult};
pub use search_select::{SearchSelect, SelectedOption};
pub use selector::{
    normalize_label, quote_css_string, OptionTemplate, Selector, Stage, TextMatch, PIERCE_MARKER,
};
pub use session::Session;
pub use wait::{
    Probe, WaitOptions, WaitOutcome, Waiter, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SEARCH_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};

#[cfg(feature = "derive")]
pub use pierce_derive::Page;

/// Async test support re-exports
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
