//! [`Driver`] over a [`MockDom`], with timed mutations.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::dom::{MockDom, NodeId};
use crate::clock::Clock;
use crate::driver::{Driver, ElementHandle, SearchScope};
use crate::result::{PierceError, PierceResult};

type Mutation = Box<dyn FnOnce(&mut MockDom) + Send>;
type InputHook = Arc<dyn Fn(&mut MockDom, NodeId, &str) + Send + Sync>;
type ClickHook = Arc<dyn Fn(&mut MockDom, NodeId) + Send + Sync>;

struct Scheduled {
    due: Duration,
    seq: u64,
    apply: Mutation,
}

struct State {
    dom: MockDom,
    pending: Vec<Scheduled>,
    next_seq: u64,
    input_hooks: Vec<(Duration, InputHook)>,
    click_hooks: Vec<ClickHook>,
    call_history: Vec<String>,
    clicks: Vec<ElementHandle>,
}

/// Mock driver for unit testing.
///
/// Mutations registered with [`MockDriver::schedule`] or [`MockDriver::on_input`]
/// are applied lazily: every driver call first settles everything whose due
/// time on the injected clock has passed. With a `FakeClock` this gives
/// deterministic "the list renders 300ms after typing" scenarios.
pub struct MockDriver {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockDriver")
            .field("clock", &self.clock)
            .field("pending", &state.pending.len())
            .field("calls", &state.call_history.len())
            .finish_non_exhaustive()
    }
}

impl MockDriver {
    /// Create a driver over `dom`, timing mutations with `clock`
    #[must_use]
    pub fn new(dom: MockDom, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                dom,
                pending: Vec::new(),
                next_seq: 0,
                input_hooks: Vec::new(),
                click_hooks: Vec::new(),
                call_history: Vec::new(),
                clicks: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock, apply due mutations, and record the call
    fn enter(&self, call: String) -> MutexGuard<'_, State> {
        let now = self.clock.now();
        let mut state = self.lock();
        settle(&mut state, now);
        state.call_history.push(call);
        state
    }

    /// Apply `mutation` once `delay` has passed on the clock
    pub fn schedule(&self, delay: Duration, mutation: impl FnOnce(&mut MockDom) + Send + 'static) {
        let due = self.clock.now() + delay;
        let mut state = self.lock();
        push_scheduled(&mut state, due, Box::new(mutation));
    }

    /// React to every `set_value`: `hook(dom, input, text)` runs `latency` later
    pub fn on_input(
        &self,
        latency: Duration,
        hook: impl Fn(&mut MockDom, NodeId, &str) + Send + Sync + 'static,
    ) {
        self.lock().input_hooks.push((latency, Arc::new(hook)));
    }

    /// React to every click, immediately
    pub fn on_click(&self, hook: impl Fn(&mut MockDom, NodeId) + Send + Sync + 'static) {
        self.lock().click_hooks.push(Arc::new(hook));
    }

    /// Inspect or mutate the document directly
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut MockDom) -> R) -> R {
        let now = self.clock.now();
        let mut state = self.lock();
        settle(&mut state, now);
        f(&mut state.dom)
    }

    /// Handle for a node
    #[must_use]
    pub fn handle_of(&self, id: NodeId) -> ElementHandle {
        handle(&self.lock().dom, id)
    }

    /// Attribute of the element behind `element`
    #[must_use]
    pub fn attribute(&self, element: &ElementHandle, name: &str) -> Option<String> {
        let state = self.lock();
        let id = node_id(&state.dom, element).ok()?;
        state.dom.attr(id, name).map(str::to_string)
    }

    /// Form value of the element behind `element`
    #[must_use]
    pub fn value(&self, element: &ElementHandle) -> Option<String> {
        let state = self.lock();
        let id = node_id(&state.dom, element).ok()?;
        state.dom.value(id).map(str::to_string)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock()
            .call_history
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Elements clicked so far, in order
    #[must_use]
    pub fn clicks(&self) -> Vec<ElementHandle> {
        self.lock().clicks.clone()
    }
}

fn push_scheduled(state: &mut State, due: Duration, apply: Mutation) {
    let seq = state.next_seq;
    state.next_seq += 1;
    state.pending.push(Scheduled { due, seq, apply });
}

fn settle(state: &mut State, now: Duration) {
    let (mut ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
        .into_iter()
        .partition(|s| s.due <= now);
    state.pending = waiting;
    ready.sort_by_key(|s| (s.due, s.seq));
    for scheduled in ready {
        (scheduled.apply)(&mut state.dom);
    }
}

fn handle(dom: &MockDom, id: NodeId) -> ElementHandle {
    ElementHandle::new(format!("n{id}"), dom.tag(id))
}

fn node_id(dom: &MockDom, element: &ElementHandle) -> PierceResult<NodeId> {
    element
        .id
        .strip_prefix('n')
        .and_then(|n| n.parse::<NodeId>().ok())
        .filter(|id| *id != dom.document() && dom.is_live(*id))
        .ok_or_else(|| PierceError::StaleElement {
            id: element.id.clone(),
        })
}

fn element_id(dom: &MockDom, element: &ElementHandle) -> PierceResult<NodeId> {
    let id = node_id(dom, element)?;
    if dom.is_element(id) {
        Ok(id)
    } else {
        Err(PierceError::driver(format!("{element} is not an element")))
    }
}

fn scope_id(dom: &MockDom, scope: &SearchScope) -> PierceResult<NodeId> {
    match scope {
        SearchScope::Document => Ok(dom.document()),
        SearchScope::Element(h) => element_id(dom, h),
        SearchScope::ShadowRoot(h) => {
            let id = node_id(dom, h)?;
            if dom.is_shadow_root(id) {
                Ok(id)
            } else {
                Err(PierceError::driver(format!("{h} is not a shadow root")))
            }
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn find_elements(
        &self,
        scope: &SearchScope,
        css: &str,
    ) -> PierceResult<Vec<ElementHandle>> {
        let state = self.enter(format!("find_elements:{scope}:{css}"));
        let root = scope_id(&state.dom, scope)?;
        let found = state
            .dom
            .query_all(root, css)
            .map_err(|reason| PierceError::invalid_selector(css, reason))?;
        Ok(found.into_iter().map(|id| handle(&state.dom, id)).collect())
    }

    async fn shadow_root(&self, element: &ElementHandle) -> PierceResult<Option<ElementHandle>> {
        let state = self.enter(format!("shadow_root:{}", element.id));
        let id = element_id(&state.dom, element)?;
        Ok(state.dom.shadow_root(id).map(|r| handle(&state.dom, r)))
    }

    async fn set_value(&self, element: &ElementHandle, text: &str) -> PierceResult<()> {
        let now = self.clock.now();
        let mut state = self.enter(format!("set_value:{}:{text}", element.id));
        let id = element_id(&state.dom, element)?;
        state.dom.set_value(id, text);
        let hooks = state.input_hooks.clone();
        for (latency, hook) in hooks {
            let text = text.to_string();
            push_scheduled(
                &mut state,
                now + latency,
                Box::new(move |dom: &mut MockDom| hook(dom, id, &text)),
            );
        }
        settle(&mut state, now);
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> PierceResult<()> {
        let mut state = self.enter(format!("click:{}", element.id));
        let id = element_id(&state.dom, element)?;
        if !state.dom.is_displayed(id) {
            return Err(PierceError::driver(format!(
                "{element} is not displayed and cannot be clicked"
            )));
        }
        state.clicks.push(element.clone());
        let hooks = state.click_hooks.clone();
        for hook in hooks {
            hook(&mut state.dom, id);
        }
        Ok(())
    }

    async fn is_displayed(&self, element: &ElementHandle) -> PierceResult<bool> {
        let state = self.enter(format!("is_displayed:{}", element.id));
        let id = element_id(&state.dom, element)?;
        Ok(state.dom.is_displayed(id))
    }

    async fn text(&self, element: &ElementHandle) -> PierceResult<String> {
        let state = self.enter(format!("text:{}", element.id));
        let id = element_id(&state.dom, element)?;
        Ok(state.dom.text_content(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mock::NodeSpec;

    fn driver() -> (MockDriver, Arc<FakeClock>) {
        let dom = MockDom::from_specs(vec![NodeSpec::new("form").children(vec![
            NodeSpec::new("input").attr("name", "q"),
            NodeSpec::new("ul"),
        ])]);
        let clock = Arc::new(FakeClock::new());
        (MockDriver::new(dom, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_scheduled_mutation_applies_when_due() {
        let (driver, clock) = driver();
        driver.schedule(Duration::from_millis(100), |dom| {
            let ul = dom.first_by_tag("ul").unwrap();
            dom.append(ul, NodeSpec::new("li").text("late"));
        });
        let doc = SearchScope::Document;
        assert!(driver.find_elements(&doc, "li").await.unwrap().is_empty());
        clock.advance(Duration::from_millis(100));
        assert_eq!(driver.find_elements(&doc, "li").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_input_hook_runs_after_latency() {
        let (driver, clock) = driver();
        driver.on_input(Duration::from_millis(300), |dom, _, text| {
            let ul = dom.first_by_tag("ul").unwrap();
            dom.append(ul, NodeSpec::new("li").text(text));
        });
        let doc = SearchScope::Document;
        let input = driver.find_element(&doc, "input").await.unwrap().unwrap();
        driver.set_value(&input, "abc").await.unwrap();
        assert_eq!(driver.value(&input).as_deref(), Some("abc"));
        clock.advance(Duration::from_millis(299));
        assert!(driver.find_elements(&doc, "li").await.unwrap().is_empty());
        clock.advance(Duration::from_millis(1));
        let li = driver.find_element(&doc, "li").await.unwrap().unwrap();
        assert_eq!(driver.text(&li).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_removed_element_is_stale() {
        let (driver, _) = driver();
        let doc = SearchScope::Document;
        let input = driver.find_element(&doc, "input").await.unwrap().unwrap();
        driver.with_dom(|dom| {
            let id = dom.first_by_tag("input").unwrap();
            dom.remove(id);
        });
        let err = driver.click(&input).await.unwrap_err();
        assert!(matches!(err, PierceError::StaleElement { .. }));
    }

    #[tokio::test]
    async fn test_invalid_css_is_invalid_selector() {
        let (driver, _) = driver();
        let err = driver
            .find_elements(&SearchScope::Document, "input[name=")
            .await
            .unwrap_err();
        assert!(matches!(err, PierceError::InvalidSelector { .. }));
    }

    #[tokio::test]
    async fn test_browser_css_is_accepted() {
        let (driver, _) = driver();
        let doc = SearchScope::Document;
        let first = driver.find_elements(&doc, "form > :first-child").await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].tag_name, "input");
        let enabled = driver
            .find_elements(&doc, "input:not([disabled])")
            .await
            .unwrap();
        assert_eq!(enabled, first);
    }

    #[tokio::test]
    async fn test_click_hook_mutates_dom() {
        let (driver, _) = driver();
        driver.on_click(|dom, id| dom.set_attr(id, "aria-expanded", "true"));
        let input_id = driver.with_dom(|dom| dom.first_by_tag("input").unwrap());
        let input = driver.handle_of(input_id);
        driver.click(&input).await.unwrap();
        assert_eq!(driver.attribute(&input, "aria-expanded").as_deref(), Some("true"));
        assert_eq!(driver.clicks(), vec![input]);
    }

    #[tokio::test]
    async fn test_hidden_element_cannot_be_clicked() {
        let (driver, _) = driver();
        let input = driver
            .find_element(&SearchScope::Document, "input")
            .await
            .unwrap()
            .unwrap();
        driver.with_dom(|dom| {
            let form = dom.first_by_tag("form").unwrap();
            dom.set_hidden(form, true);
        });
        assert!(driver.click(&input).await.is_err());
        assert!(driver.clicks().is_empty());
        assert!(driver.was_called("click"));
    }
}
