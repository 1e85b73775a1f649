//! Search-select: drive a searchable dropdown component.
//!
//! Searchable dropdowns (`ak-search-select` and friends) render a text input
//! inside their shadow root and fetch matching options asynchronously after
//! each keystroke. Selecting one reliably means:
//!
//! 1. find the component (container) and the text input inside it,
//! 2. focus it, clear it, and type the filter text,
//! 3. poll until a displayed option whose label satisfies the filter shows up,
//! 4. click that option.
//!
//! The option template carries both the element part and the filter, e.g.
//! `button*=default` selects the first displayed `button` whose label
//! contains `default`.

use std::time::Duration;
use tracing::{debug, info};

use crate::driver::{ElementHandle, SearchScope};
use crate::locator::{resolve_selector, roots_of, Locator};
use crate::result::{PierceError, PierceResult};
use crate::selector::{normalize_label, quote_css_string, OptionTemplate, Selector, TextMatch};
use crate::session::Session;
use crate::wait::{Probe, WaitOptions};

/// The option that was clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOption {
    /// Handle of the clicked option
    pub element: ElementHandle,
    /// Its normalized label
    pub label: String,
    /// Time spent waiting for it to render
    pub elapsed: Duration,
    /// Option list evaluations
    pub attempts: u32,
}

/// A configured search-select interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSelect {
    container: String,
    input_name: String,
    option_template: String,
    options_within: Option<String>,
    wait: Option<WaitOptions>,
}

impl SearchSelect {
    /// `container` locates the component, `input_name` names its text input,
    /// `option_template` is `css*=text` or `css=text`
    #[must_use]
    pub fn new(
        container: impl Into<String>,
        input_name: impl Into<String>,
        option_template: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            input_name: input_name.into(),
            option_template: option_template.into(),
            options_within: None,
            wait: None,
        }
    }

    /// Look for options under this element instead of the whole document
    #[must_use]
    pub fn options_within(mut self, selector: impl Into<String>) -> Self {
        self.options_within = Some(selector.into());
        self
    }

    /// Override the session's search wait bounds
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Container selector
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Input `name` attribute
    #[must_use]
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Option template as written
    #[must_use]
    pub fn option_template(&self) -> &str {
        &self.option_template
    }

    /// Selector for the component's text input, relative to the container.
    ///
    /// Only an input carrying `name="<input_name>"` qualifies; other inputs
    /// in the component are never typed into.
    #[must_use]
    pub fn input_selector(&self) -> String {
        format!(">>>input[name={}]", quote_css_string(&self.input_name))
    }

    /// Run the interaction once.
    ///
    /// # Errors
    ///
    /// - [`PierceError::InvalidSelector`] for a malformed template, before
    ///   anything is typed
    /// - [`PierceError::NotFound`] when the container or its input is absent
    /// - [`PierceError::NoMatch`] when options rendered but none satisfied the
    ///   filter within the wait
    /// - [`PierceError::Timeout`] when no option rendered at all
    pub async fn run(&self, session: &Session) -> PierceResult<SelectedOption> {
        let template = OptionTemplate::parse(&self.option_template)?;
        let option_selector = match self.options_within {
            Some(_) => template.selector().clone(),
            None => template.selector().clone().piercing(),
        };
        let wait = self.wait.unwrap_or(session.config().search);

        let container = Locator::new(self.container.as_str()).resolve1(session).await?;
        let input = Locator::new(self.input_selector())
            .within(container.clone())
            .resolve1(session)
            .await?;

        let filter = template.filter_text();
        debug!(container = %container, input = %input, filter, "typing search filter");
        let driver = session.driver();
        driver.click(&input).await?;
        driver.clear_value(&input).await?;
        driver.set_value(&input, filter).await?;

        let waited_for = format!(
            "option {} matching {:?}",
            option_selector.raw(),
            template.text().text()
        );
        let this = self;
        let selector = &option_selector;
        let text = template.text();
        let outcome = session
            .waiter()
            .wait_until(&waited_for, &wait, move || async move {
                let Some(roots) = this.option_roots(session).await? else {
                    return Ok(Probe::Pending("option container not rendered".to_string()));
                };
                let candidates = displayed_options(session, roots, selector).await?;
                match candidates.iter().find(|(_, label)| text.matches(label)) {
                    Some((element, label)) => Ok(Probe::Ready((element.clone(), label.clone()))),
                    None if candidates.is_empty() => {
                        Ok(Probe::Pending("no option displayed".to_string()))
                    }
                    None => Ok(Probe::Pending(format!(
                        "{} option(s) displayed, none matching: {:?}",
                        candidates.len(),
                        labels(&candidates)
                    ))),
                }
            })
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(timeout @ PierceError::Timeout { .. }) => {
                return Err(self.classify_timeout(session, selector, text, timeout).await);
            }
            Err(e) => return Err(e),
        };

        let (element, label) = outcome.value;
        driver.click(&element).await?;
        info!(
            container = %self.container,
            option = %element,
            label = %label,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            attempts = outcome.attempts,
            "search-select picked option"
        );
        Ok(SelectedOption {
            element,
            label,
            elapsed: outcome.elapsed,
            attempts: outcome.attempts,
        })
    }

    /// Roots to search for options; `None` while the options container is absent
    async fn option_roots(&self, session: &Session) -> PierceResult<Option<Vec<SearchScope>>> {
        let Some(within) = &self.options_within else {
            return Ok(Some(vec![SearchScope::Document]));
        };
        match Locator::new(within.as_str()).resolve1(session).await {
            Ok(root) => Ok(Some(roots_of(session.driver(), Some(&root)).await?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tell "options rendered but none matched" apart from "nothing rendered"
    async fn classify_timeout(
        &self,
        session: &Session,
        selector: &Selector,
        text: &TextMatch,
        timeout: PierceError,
    ) -> PierceError {
        let snapshot = match self.option_roots(session).await {
            Ok(Some(roots)) => displayed_options(session, roots, selector).await,
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(e),
        };
        match snapshot {
            Ok(candidates) if !candidates.is_empty() => PierceError::NoMatch {
                selector: self.option_template.clone(),
                filter: text.text().to_string(),
                seen: labels(&candidates),
            },
            _ => timeout,
        }
    }
}

/// Displayed elements matching `selector`, with normalized labels
async fn displayed_options(
    session: &Session,
    roots: Vec<SearchScope>,
    selector: &Selector,
) -> PierceResult<Vec<(ElementHandle, String)>> {
    let driver = session.driver();
    let matches = resolve_selector(driver, roots, selector).await?.into_matches();
    let mut out = Vec::with_capacity(matches.len());
    for element in matches {
        // options re-render while the filter applies; skip ones that vanished
        let shown = match driver.is_displayed(&element).await {
            Ok(shown) => shown,
            Err(PierceError::StaleElement { .. }) => continue,
            Err(e) => return Err(e),
        };
        if !shown {
            continue;
        }
        let label = match driver.text(&element).await {
            Ok(text) => normalize_label(&text),
            Err(PierceError::StaleElement { .. }) => continue,
            Err(e) => return Err(e),
        };
        out.push((element, label));
    }
    Ok(out)
}

fn labels(candidates: &[(ElementHandle, String)]) -> Vec<String> {
    candidates.iter().map(|(_, label)| label.clone()).collect()
}
