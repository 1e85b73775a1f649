//! Piercing locator: resolves selectors across shadow-DOM boundaries.
//!
//! # Design
//!
//! - **Lazy**: a [`Locator`] is only a selector plus options. Every call
//!   re-resolves it against the live document; nothing is cached.
//! - **Piercing**: stages after a `>>>` marker are matched inside every
//!   shadow root reachable from the previous stage's matches, to any depth.
//! - **Absent is not an error of its own kind**: a stage that matches
//!   nothing short-circuits to [`PierceError::NotFound`], while malformed
//!   selectors fail with [`PierceError::InvalidSelector`] before the driver
//!   is touched.
//!
//! Ordering of matches: document order within each search root; roots in the
//! order they were discovered, depth-first.

use std::collections::HashSet;
use tracing::{debug, trace};

use crate::driver::{Driver, ElementHandle, SearchScope};
use crate::result::{PierceError, PierceResult};
use crate::selector::{normalize_label, Selector, TextMatch};
use crate::session::Session;
use crate::wait::{Probe, WaitOptions};

// =============================================================================
// RESOLUTION
// =============================================================================

/// Outcome of resolving a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Matches of the final stage, in order
    Found(Vec<ElementHandle>),
    /// Stage `stage` matched nothing
    Missing {
        /// Index of the empty stage
        stage: usize,
    },
}

impl Resolution {
    /// Matches, or an empty list when missing
    #[must_use]
    pub fn into_matches(self) -> Vec<ElementHandle> {
        match self {
            Self::Found(matches) => matches,
            Self::Missing { .. } => Vec::new(),
        }
    }
}

/// Search roots for a scoped resolution: the element and its own shadow root
pub async fn roots_of(
    driver: &dyn Driver,
    root: Option<&ElementHandle>,
) -> PierceResult<Vec<SearchScope>> {
    let Some(root) = root else {
        return Ok(vec![SearchScope::Document]);
    };
    let mut roots = vec![SearchScope::Element(root.clone())];
    if let Some(shadow) = driver.shadow_root(root).await? {
        roots.push(SearchScope::ShadowRoot(shadow));
    }
    Ok(roots)
}

/// Resolve `selector` starting from `roots`, stage by stage.
pub async fn resolve_selector(
    driver: &dyn Driver,
    mut roots: Vec<SearchScope>,
    selector: &Selector,
) -> PierceResult<Resolution> {
    let last = selector.stages().len() - 1;

    for (index, stage) in selector.stages().iter().enumerate() {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for root in &roots {
            let found = if stage.pierces() {
                pierce_query(driver, root, stage.css()).await?
            } else {
                driver.find_elements(root, stage.css()).await?
            };
            for element in found {
                if seen.insert(element.id.clone()) {
                    matches.push(element);
                }
            }
        }

        trace!(
            selector = selector.raw(),
            stage = index,
            css = stage.css(),
            roots = roots.len(),
            matches = matches.len(),
            "resolved stage"
        );

        if matches.is_empty() {
            debug!(selector = selector.raw(), stage = index, "stage matched nothing");
            return Ok(Resolution::Missing { stage: index });
        }
        if index == last {
            return Ok(Resolution::Found(matches));
        }

        let mut next = Vec::with_capacity(matches.len() * 2);
        for element in matches {
            let shadow = driver.shadow_root(&element).await?;
            next.push(SearchScope::Element(element));
            if let Some(shadow) = shadow {
                next.push(SearchScope::ShadowRoot(shadow));
            }
        }
        roots = next;
    }

    // Selector::parse never yields zero stages
    Ok(Resolution::Missing { stage: 0 })
}

/// Match `css` in `root` and in every shadow root nested beneath it.
///
/// Explicit depth-first stack: a root's own matches come first, then each
/// shadow root under it in host document order, fully, before the next.
async fn pierce_query(
    driver: &dyn Driver,
    root: &SearchScope,
    css: &str,
) -> PierceResult<Vec<ElementHandle>> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];

    while let Some(scope) = stack.pop() {
        out.extend(driver.find_elements(&scope, css).await?);
        let shadows = driver.shadow_hosts(&scope).await?;
        stack.extend(shadows.into_iter().rev().map(SearchScope::ShadowRoot));
    }

    Ok(out)
}

// =============================================================================
// LOCATOR
// =============================================================================

/// Locator options for customizing behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Override of the session wait timeout
    pub timeout_ms: Option<u64>,
    /// Override of the session poll interval
    pub poll_interval_ms: Option<u64>,
    /// Fail `resolve1` when more than one element matches
    pub strict: bool,
}

/// A lazily resolved reference to the element(s) matched by a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    selector: String,
    root: Option<ElementHandle>,
    options: LocatorOptions,
}

impl Locator {
    /// Create a locator rooted at the document
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            root: None,
            options: LocatorOptions::default(),
        }
    }

    /// Resolve inside `root` (its light subtree and its shadow root)
    #[must_use]
    pub fn within(mut self, root: ElementHandle) -> Self {
        self.root = Some(root);
        self
    }

    /// Set a custom wait timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set a custom poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.options.poll_interval_ms = Some(poll_interval_ms);
        self
    }

    /// Require exactly one match in `resolve1`
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    /// The selector as written
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Root element, if scoped
    #[must_use]
    pub const fn root(&self) -> Option<&ElementHandle> {
        self.root.as_ref()
    }

    /// The options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Wait options after applying this locator's overrides
    #[must_use]
    pub fn wait_options(&self, session: &Session) -> WaitOptions {
        let base = session.config().wait;
        WaitOptions {
            timeout_ms: self.options.timeout_ms.unwrap_or(base.timeout_ms),
            poll_interval_ms: self.options.poll_interval_ms.unwrap_or(base.poll_interval_ms),
        }
    }

    async fn resolution(&self, session: &Session) -> PierceResult<(Selector, Resolution)> {
        let selector = Selector::parse(&self.selector)?;
        let driver = session.driver();
        let roots = roots_of(driver, self.root.as_ref()).await?;
        let resolution = resolve_selector(driver, roots, &selector).await?;
        Ok((selector, resolution))
    }

    /// All matching elements, in order (empty when absent)
    pub async fn resolve(&self, session: &Session) -> PierceResult<Vec<ElementHandle>> {
        let (_, resolution) = self.resolution(session).await?;
        Ok(resolution.into_matches())
    }

    /// The single element this locator refers to
    ///
    /// # Errors
    ///
    /// [`PierceError::NotFound`] naming the empty stage, or
    /// [`PierceError::Ambiguous`] for a strict locator with several matches.
    pub async fn resolve1(&self, session: &Session) -> PierceResult<ElementHandle> {
        let (selector, resolution) = self.resolution(session).await?;
        match resolution {
            Resolution::Missing { stage } => Err(PierceError::NotFound {
                selector: self.selector.clone(),
                stage,
                stage_selector: selector
                    .stages()
                    .get(stage)
                    .map(|s| s.css().to_string())
                    .unwrap_or_default(),
            }),
            Resolution::Found(matches) if self.options.strict && matches.len() > 1 => {
                Err(PierceError::Ambiguous {
                    selector: self.selector.clone(),
                    count: matches.len(),
                })
            }
            Resolution::Found(matches) => matches.into_iter().next().ok_or_else(|| {
                PierceError::NotFound {
                    selector: self.selector.clone(),
                    stage: selector.stages().len() - 1,
                    stage_selector: String::new(),
                }
            }),
        }
    }

    /// Whether at least one element matches
    pub async fn exists(&self, session: &Session) -> PierceResult<bool> {
        Ok(!self.resolve(session).await?.is_empty())
    }

    /// Number of matching elements
    pub async fn count(&self, session: &Session) -> PierceResult<usize> {
        Ok(self.resolve(session).await?.len())
    }

    /// Whether the element is present and displayed (absent → `false`)
    pub async fn is_displayed(&self, session: &Session) -> PierceResult<bool> {
        match self.resolve1(session).await {
            Ok(element) => session.driver().is_displayed(&element).await,
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Click the element
    pub async fn click(&self, session: &Session) -> PierceResult<()> {
        let element = self.resolve1(session).await?;
        debug!(selector = %self.selector, element = %element, "click");
        session.driver().click(&element).await
    }

    /// Replace the element's value
    pub async fn set_value(&self, session: &Session, text: &str) -> PierceResult<()> {
        let element = self.resolve1(session).await?;
        debug!(selector = %self.selector, element = %element, "set value");
        session.driver().set_value(&element, text).await
    }

    /// Clear the element's value
    pub async fn clear(&self, session: &Session) -> PierceResult<()> {
        let element = self.resolve1(session).await?;
        session.driver().clear_value(&element).await
    }

    /// Rendered text of the element
    pub async fn text(&self, session: &Session) -> PierceResult<String> {
        let element = self.resolve1(session).await?;
        session.driver().text(&element).await
    }

    /// Wait until the selector matches something
    pub async fn wait_for_exist(&self, session: &Session) -> PierceResult<ElementHandle> {
        let what = format!("{} to exist", self.selector);
        let this = self;
        let outcome = session
            .waiter()
            .wait_until(&what, &self.wait_options(session), move || async move {
                match this.resolve1(session).await {
                    Ok(element) => Ok(Probe::Ready(element)),
                    Err(PierceError::NotFound { stage, .. }) => {
                        Ok(Probe::Pending(format!("stage {stage} matched nothing")))
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(outcome.value)
    }

    /// Wait until the element exists and is displayed
    pub async fn wait_for_displayed(&self, session: &Session) -> PierceResult<ElementHandle> {
        let what = format!("{} to be displayed", self.selector);
        let this = self;
        let outcome = session
            .waiter()
            .wait_until(&what, &self.wait_options(session), move || async move {
                let element = match this.resolve1(session).await {
                    Ok(element) => element,
                    Err(PierceError::NotFound { stage, .. }) => {
                        return Ok(Probe::Pending(format!("stage {stage} matched nothing")));
                    }
                    Err(e) => return Err(e),
                };
                if session.driver().is_displayed(&element).await? {
                    Ok(Probe::Ready(element))
                } else {
                    Ok(Probe::Pending(format!("{element} present but hidden")))
                }
            })
            .await?;
        Ok(outcome.value)
    }

    /// Wait until the element's text satisfies `expected`
    pub async fn wait_for_text(
        &self,
        session: &Session,
        expected: &TextMatch,
    ) -> PierceResult<ElementHandle> {
        let what = format!("{} to have text {:?}", self.selector, expected.text());
        let this = self;
        let outcome = session
            .waiter()
            .wait_until(&what, &self.wait_options(session), move || async move {
                let element = match this.resolve1(session).await {
                    Ok(element) => element,
                    Err(PierceError::NotFound { stage, .. }) => {
                        return Ok(Probe::Pending(format!("stage {stage} matched nothing")));
                    }
                    Err(e) => return Err(e),
                };
                let text = session.driver().text(&element).await?;
                if expected.matches(&text) {
                    Ok(Probe::Ready(element))
                } else {
                    Ok(Probe::Pending(format!("text is {:?}", normalize_label(&text))))
                }
            })
            .await?;
        Ok(outcome.value)
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.root {
            Some(root) => write!(f, "{} within {root}", self.selector),
            None => f.write_str(&self.selector),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mock::{MockDom, MockDriver, NodeSpec};
    use crate::result::FailureKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn session_for(dom: MockDom) -> (Session, Arc<MockDriver>, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let driver = Arc::new(MockDriver::new(dom, clock.clone()));
        let session = Session::new(driver.clone()).with_clock(clock.clone());
        (session, driver, clock)
    }

    /// `<ak-form>` hosting a shadow root with a named input inside
    fn form_dom() -> MockDom {
        MockDom::from_specs(vec![NodeSpec::new("ak-form")
            .attr("name", "provider")
            .shadow(vec![NodeSpec::new("div").class("form-body").child(
                NodeSpec::new("input")
                    .attr("name", "externalHost")
                    .attr("type", "text"),
            )])])
    }

    mod resolution_tests {
        use super::*;

        #[tokio::test]
        async fn test_plain_selector_does_not_enter_shadow_roots() {
            let (session, _, _) = session_for(form_dom());
            let found = Locator::new("input[name=\"externalHost\"]")
                .resolve(&session)
                .await
                .unwrap();
            assert!(found.is_empty());
        }

        #[tokio::test]
        async fn test_piercing_selector_enters_shadow_roots() {
            let (session, _, _) = session_for(form_dom());
            let input = Locator::new(">>>input[name=\"externalHost\"]")
                .resolve1(&session)
                .await
                .unwrap();
            assert_eq!(input.tag_name, "input");
        }

        #[tokio::test]
        async fn test_staged_selector_scopes_to_host() {
            let dom = MockDom::from_specs(vec![
                NodeSpec::new("ak-form")
                    .attr("name", "a")
                    .shadow(vec![NodeSpec::new("input").attr("id", "in-a")]),
                NodeSpec::new("ak-form")
                    .attr("name", "b")
                    .shadow(vec![NodeSpec::new("input").attr("id", "in-b")]),
            ]);
            let (session, driver, _) = session_for(dom);
            let input = Locator::new("ak-form[name=\"b\"] >>> input")
                .resolve1(&session)
                .await
                .unwrap();
            assert_eq!(driver.attribute(&input, "id").as_deref(), Some("in-b"));
        }

        #[tokio::test]
        async fn test_missing_stage_reports_not_found_with_stage() {
            let (session, _, _) = session_for(form_dom());
            let err = Locator::new("ak-form >>> select")
                .resolve1(&session)
                .await
                .unwrap_err();
            match err {
                PierceError::NotFound {
                    stage,
                    stage_selector,
                    ..
                } => {
                    assert_eq!(stage, 1);
                    assert_eq!(stage_selector, "select");
                }
                other => panic!("expected NotFound, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_first_stage_missing_short_circuits() {
            let (session, driver, _) = session_for(form_dom());
            let err = Locator::new("ak-missing >>> input")
                .resolve1(&session)
                .await
                .unwrap_err();
            assert!(err.is_not_found());
            assert!(!driver.was_called("shadow_root"));
        }

        #[tokio::test]
        async fn test_malformed_selector_never_reaches_driver() {
            let (session, driver, _) = session_for(form_dom());
            let err = Locator::new("ak-form >>>").resolve1(&session).await.unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidSelector);
            assert!(driver.history().is_empty());
        }

        #[tokio::test]
        async fn test_order_is_document_then_depth_first() {
            let dom = MockDom::from_specs(vec![
                NodeSpec::new("button").text("light-1"),
                NodeSpec::new("x-outer").shadow(vec![
                    NodeSpec::new("button").text("outer-1"),
                    NodeSpec::new("x-inner").shadow(vec![NodeSpec::new("button").text("inner-1")]),
                    NodeSpec::new("button").text("outer-2"),
                ]),
                NodeSpec::new("button").text("light-2"),
                NodeSpec::new("x-last").shadow(vec![NodeSpec::new("button").text("last-1")]),
            ]);
            let (session, _, _) = session_for(dom);
            let locator = Locator::new(">>>button");
            let mut labels = Vec::new();
            for el in locator.resolve(&session).await.unwrap() {
                labels.push(session.driver().text(&el).await.unwrap());
            }
            assert_eq!(
                labels,
                vec!["light-1", "light-2", "outer-1", "outer-2", "inner-1", "last-1"]
            );
        }

        #[tokio::test]
        async fn test_strict_locator_rejects_multiple() {
            let dom = MockDom::from_specs(vec![NodeSpec::new("li"), NodeSpec::new("li")]);
            let (session, _, _) = session_for(dom);
            let err = Locator::new("li")
                .with_strict(true)
                .resolve1(&session)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::Ambiguous);
            assert_eq!(Locator::new("li").count(&session).await.unwrap(), 2);
        }

        #[tokio::test]
        async fn test_within_searches_root_shadow() {
            let (session, _, _) = session_for(form_dom());
            let host = Locator::new("ak-form").resolve1(&session).await.unwrap();
            let input = Locator::new(">>>input").within(host).resolve1(&session).await;
            assert!(input.is_ok());
        }
    }

    mod interaction_tests {
        use super::*;

        #[tokio::test]
        async fn test_set_value_and_text_re_resolve_each_call() {
            let (session, driver, _) = session_for(form_dom());
            let locator = Locator::new(">>>input[name=\"externalHost\"]");
            locator.set_value(&session, "https://proxy.local").await.unwrap();
            let input = locator.resolve1(&session).await.unwrap();
            assert_eq!(driver.value(&input).as_deref(), Some("https://proxy.local"));
            locator.clear(&session).await.unwrap();
            assert_eq!(driver.value(&input).as_deref(), Some(""));
        }

        #[tokio::test]
        async fn test_is_displayed_false_when_absent() {
            let (session, _, _) = session_for(form_dom());
            let shown = Locator::new(">>>textarea").is_displayed(&session).await.unwrap();
            assert!(!shown);
        }

        #[tokio::test]
        async fn test_click_missing_element_is_not_found() {
            let (session, _, _) = session_for(form_dom());
            let err = Locator::new(">>>button").click(&session).await.unwrap_err();
            assert!(err.is_not_found());
        }
    }

    mod wait_tests {
        use super::*;

        #[tokio::test]
        async fn test_wait_for_exist_sees_late_element() {
            let (session, driver, _) = session_for(form_dom());
            driver.schedule(Duration::from_millis(120), |dom| {
                let root = dom.document();
                dom.append(root, NodeSpec::new("ak-toast").text("Saved"));
            });
            let toast = Locator::new("ak-toast").wait_for_exist(&session).await.unwrap();
            assert_eq!(toast.tag_name, "ak-toast");
        }

        #[tokio::test]
        async fn test_wait_for_displayed_times_out_on_hidden() {
            let dom = MockDom::from_specs(vec![NodeSpec::new("dialog").hidden()]);
            let (session, _, clock) = session_for(dom);
            let err = Locator::new("dialog")
                .with_timeout(400)
                .with_poll_interval(100)
                .wait_for_displayed(&session)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::Timeout);
            assert!(err.to_string().contains("hidden"));
            assert_eq!(clock.now_ms(), 400);
        }

        #[tokio::test]
        async fn test_wait_for_text() {
            let dom = MockDom::from_specs(vec![NodeSpec::new("h1").text("Loading")]);
            let (session, driver, _) = session_for(dom);
            driver.schedule(Duration::from_millis(200), |dom| {
                if let Some(h1) = dom.first_by_tag("h1") {
                    dom.set_text(h1, "Create Proxy Provider");
                }
            });
            let found = Locator::new("h1")
                .wait_for_text(&session, &TextMatch::Contains("Proxy".into()))
                .await;
            assert!(found.is_ok());
        }
    }
}
