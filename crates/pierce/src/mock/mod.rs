//! In-memory browser for unit tests.
//!
//! [`MockDom`] models just enough of a document for page objects to run
//! against: elements with attributes and text, visibility, form values, and
//! open shadow roots. Selectors are matched with `scraper`, so any CSS a
//! browser accepts in `querySelectorAll` works here too. [`MockDriver`]
//! exposes it through the [`Driver`] trait and applies timed mutations
//! against an injected clock.
//!
//! [`Driver`]: crate::driver::Driver

mod dom;
mod driver;

pub use dom::{MockDom, NodeId, NodeSpec};
pub use driver::MockDriver;
