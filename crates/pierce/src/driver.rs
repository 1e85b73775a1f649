//! Driver - Abstract Browser Automation Seam
//!
//! Everything pierce does is expressed in terms of a handful of primitive
//! browser operations. The [`Driver`] trait names them; implementations
//! adapt a real automation backend (see `cdp` behind the `browser` feature)
//! or an in-memory document (see [`crate::mock`]).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Page objects / Locator / SearchSelect                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Driver (trait)                                              │
//! │   find_elements · shadow_root · set_value · click · ...      │
//! ├───────────────────────────┬──────────────────────────────────┤
//! │  CdpDriver (chromiumoxide)│  MockDriver (MockDom)            │
//! └───────────────────────────┴──────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::PierceResult;

/// Opaque handle to an element (or shadow root) issued by a driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-issued identifier, unique within one document
    pub id: String,
    /// Lower-case tag name (`#shadow-root` for shadow roots)
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
        }
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}#{}>", self.tag_name, self.id)
    }
}

/// Where a query starts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// The top-level document (light DOM only)
    Document,
    /// Descendants of an element (light DOM only)
    Element(ElementHandle),
    /// Descendants of a shadow root
    ShadowRoot(ElementHandle),
}

impl SearchScope {
    /// Handle backing this scope, if any
    #[must_use]
    pub const fn handle(&self) -> Option<&ElementHandle> {
        match self {
            Self::Document => None,
            Self::Element(h) | Self::ShadowRoot(h) => Some(h),
        }
    }
}

impl std::fmt::Display for SearchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => f.write_str("document"),
            Self::Element(h) => write!(f, "{h}"),
            Self::ShadowRoot(h) => write!(f, "shadow({})", h.id),
        }
    }
}

/// Primitive browser operations used by pierce.
///
/// Queries never pierce shadow roots on their own: `find_elements` behaves
/// like `querySelectorAll` on the scope node. Piercing is layered on top by
/// [`crate::locator`].
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// All elements under `scope` matching `css`, in document order
    async fn find_elements(&self, scope: &SearchScope, css: &str)
        -> PierceResult<Vec<ElementHandle>>;

    /// First element under `scope` matching `css`
    async fn find_element(
        &self,
        scope: &SearchScope,
        css: &str,
    ) -> PierceResult<Option<ElementHandle>> {
        Ok(self.find_elements(scope, css).await?.into_iter().next())
    }

    /// Shadow root attached to `element`, if it has an open one
    async fn shadow_root(&self, element: &ElementHandle) -> PierceResult<Option<ElementHandle>>;

    /// Shadow roots of the elements under `scope` (hosts in document order).
    ///
    /// The default walks every element; drivers with a cheaper way to list
    /// hosts should override it.
    async fn shadow_hosts(&self, scope: &SearchScope) -> PierceResult<Vec<ElementHandle>> {
        let mut roots = Vec::new();
        for element in self.find_elements(scope, "*").await? {
            if let Some(root) = self.shadow_root(&element).await? {
                roots.push(root);
            }
        }
        Ok(roots)
    }

    /// Replace the value of an input-like element, firing input events
    async fn set_value(&self, element: &ElementHandle, text: &str) -> PierceResult<()>;

    /// Clear the value of an input-like element
    async fn clear_value(&self, element: &ElementHandle) -> PierceResult<()> {
        self.set_value(element, "").await
    }

    /// Click the element
    async fn click(&self, element: &ElementHandle) -> PierceResult<()>;

    /// Whether the element is rendered and visible
    async fn is_displayed(&self, element: &ElementHandle) -> PierceResult<bool>;

    /// Rendered text content of the element
    async fn text(&self, element: &ElementHandle) -> PierceResult<String>;
}
