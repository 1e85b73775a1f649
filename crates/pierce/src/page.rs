//! Page objects and the shared page registry.
//!
//! A page object names the selectors of one screen (or one form) and the
//! interactions on it, so tests talk about "set the authorization flow"
//! instead of shadow roots and polling.
//!
//! ```ignore
//! #[derive(Debug, Default, Page)]
//! #[page(name = "forward-proxy-form", locator(external_host = ">>>input[name=\"externalHost\"]"))]
//! struct ForwardProxyForm;
//!
//! impl ForwardProxyForm {
//!     async fn set_authorization_flow(&self, session: &Session, label: &str) -> PierceResult<SelectedOption> {
//!         self.search_select(session, "ak-flow-search[name=\"authorizationFlow\"]",
//!             "authorizationFlow", &format!("button*={label}")).await
//!     }
//! }
//!
//! let form = ForwardProxyForm::shared();
//! form.external_host().set_value(&session, "https://proxy.local").await?;
//! ```
//!
//! Pages hold no per-test state (everything lives on the [`Session`]), so one
//! instance per type is shared by the whole process through [`shared`].

use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

use crate::driver::ElementHandle;
use crate::locator::Locator;
use crate::result::PierceResult;
use crate::search_select::{SearchSelect, SelectedOption};
use crate::session::Session;

/// Behaviour shared by every page object.
#[async_trait]
pub trait Page: Send + Sync + 'static {
    /// Page name for logging/debugging
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Named selectors this page declares, as `(getter, selector)`
    fn locators(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Lazy locator for `selector` (piercing with `>>>`)
    fn locate(&self, selector: &str) -> Locator {
        Locator::new(selector)
    }

    /// Resolve `selector` to exactly the first match, or fail with `NotFound`
    async fn locate1(&self, session: &Session, selector: &str) -> PierceResult<ElementHandle> {
        self.locate(selector).resolve1(session).await
    }

    /// Pick an option from the searchable dropdown at `container`
    async fn search_select(
        &self,
        session: &Session,
        container: &str,
        input_name: &str,
        option_template: &str,
    ) -> PierceResult<SelectedOption> {
        debug!(page = self.name(), container, option_template, "search-select");
        SearchSelect::new(container, input_name, option_template)
            .run(session)
            .await
    }

    /// The process-wide instance of this page
    fn shared() -> &'static Self
    where
        Self: Sized + Default,
    {
        shared::<Self>()
    }
}

type Cell = &'static (dyn Any + Send + Sync);

/// One type's `OnceLock<P>`, type-erased
#[derive(Clone, Copy)]
struct Entry {
    cell: Cell,
    name: fn(Cell) -> Option<&'static str>,
}

fn registry() -> &'static Mutex<HashMap<TypeId, Entry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<TypeId, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn constructed_name<P: Page>(cell: Cell) -> Option<&'static str> {
    cell.downcast_ref::<OnceLock<P>>()?.get().map(Page::name)
}

/// The instance slot of `P`, created empty on first request
fn cell_of<P: Page>() -> &'static OnceLock<P> {
    let mut cells = registry().lock().unwrap_or_else(PoisonError::into_inner);
    let id = TypeId::of::<P>();
    if let Some(cell) = cells
        .get(&id)
        .and_then(|e| e.cell.downcast_ref::<OnceLock<P>>())
    {
        return cell;
    }
    let cell: &'static OnceLock<P> = Box::leak(Box::new(OnceLock::new()));
    cells.insert(
        id,
        Entry {
            cell,
            name: constructed_name::<P>,
        },
    );
    cell
}

/// The shared instance of `P`, constructed on first use.
///
/// The registry lock only guards slot lookup; `P::default()` runs under the
/// per-type slot, so concurrent first calls still observe a single instance
/// and a `Default` impl may itself call [`shared`] for other page types.
/// Instances live for the rest of the process.
pub fn shared<P: Page + Default>() -> &'static P {
    cell_of::<P>().get_or_init(|| {
        let page = P::default();
        debug!(page = page.name(), "constructed shared page");
        page
    })
}

/// Names of the pages constructed through [`shared`], sorted
#[must_use]
pub fn registered_pages() -> Vec<&'static str> {
    let pages = registry().lock().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<_> = pages.values().filter_map(|e| (e.name)(e.cell)).collect();
    names.sort_unstable();
    names
}
