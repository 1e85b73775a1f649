//! Chromium driver over the Chrome DevTools Protocol.
//!
//! Element handles live in an in-page registry (`globalThis.__pierce`) that
//! is installed lazily by every evaluation, so navigation never leaves the
//! driver without its helpers. Handles whose node has been disconnected
//! report [`PierceError::StaleElement`] and are dropped from the registry;
//! every query also sweeps out handles whose node has left the document, so
//! re-rendered option lists do not pin detached nodes.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::driver::{Driver, ElementHandle, SearchScope};
use crate::result::{PierceError, PierceResult};

/// In-page helper; must stay an assignment expression (not a parenthesised
/// function) so it is evaluated rather than called.
const HELPER: &str = r#"globalThis.__pierce = globalThis.__pierce || {
  next: 1,
  nodes: new Map(),
  handle(node) {
    if (!node.__pierceId) { node.__pierceId = 'h' + (this.next++); }
    this.nodes.set(node.__pierceId, node);
    const tag = node instanceof ShadowRoot ? '#shadow-root' : node.tagName.toLowerCase();
    return { id: node.__pierceId, tag_name: tag };
  },
  node(id) {
    const n = this.nodes.get(id);
    if (n && n.isConnected) { return n; }
    this.nodes.delete(id);
    return null;
  },
  sweep() {
    for (const [id, n] of this.nodes) {
      if (!n.isConnected) { this.nodes.delete(id); }
    }
  },
  run(scopeId, f) {
    const n = scopeId === null ? document : this.node(scopeId);
    if (!n) { return { stale: true }; }
    try { return { done: true, value: f(n) }; }
    catch (e) { return { error: String(e), invalid: e && e.name === 'SyntaxError' }; }
  },
  find(s, css) {
    this.sweep();
    return this.run(s, n => Array.from(n.querySelectorAll(css), e => this.handle(e)));
  },
  shadow(id) { return this.run(id, n => n.shadowRoot ? this.handle(n.shadowRoot) : null); },
  hosts(s) {
    this.sweep();
    return this.run(s, n => Array.from(n.querySelectorAll('*'))
      .filter(e => e.shadowRoot)
      .map(e => this.handle(e.shadowRoot)));
  },
  setValue(id, text) {
    return this.run(id, n => {
      if (n.focus) { n.focus(); }
      n.value = text;
      n.dispatchEvent(new Event('input', { bubbles: true, composed: true }));
      n.dispatchEvent(new Event('change', { bubbles: true, composed: true }));
      return null;
    });
  },
  click(id) { return this.run(id, n => { n.click(); return null; }); },
  displayed(id) {
    return this.run(id, n => {
      if (n.checkVisibility) { return n.checkVisibility({ visibilityProperty: true }); }
      const style = getComputedStyle(n);
      const rect = n.getBoundingClientRect();
      return style.display !== 'none' && style.visibility !== 'hidden' && (rect.width > 0 || rect.height > 0);
    });
  },
  text(id) { return this.run(id, n => n.innerText !== undefined ? n.innerText : n.textContent); },
}"#;

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    stale: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    invalid: bool,
}

/// Options for [`CdpDriver::launch`]
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a window
    pub headless: bool,
    /// Chromium sandbox (disable in containers)
    pub sandbox: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
        }
    }
}

impl LaunchOptions {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }
}

/// [`Driver`] backed by a chromium page
#[derive(Debug)]
pub struct CdpDriver {
    page: CdpPage,
    browser: Option<Arc<Mutex<Browser>>>,
    handler: Option<JoinHandle<()>>,
}

impl CdpDriver {
    /// Drive an existing page
    #[must_use]
    pub fn new(page: CdpPage) -> Self {
        Self {
            page,
            browser: None,
            handler: None,
        }
    }

    /// Launch chromium and open `url`
    pub async fn launch(options: LaunchOptions, url: &str) -> PierceResult<Self> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = options.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(PierceError::driver)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PierceError::driver(format!("launching chromium: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page(url)
            .await
            .map_err(|e| PierceError::driver(format!("opening {url}: {e}")))?;
        debug!(url, "chromium page opened");

        Ok(Self {
            page,
            browser: Some(Arc::new(Mutex::new(browser))),
            handler: Some(handler),
        })
    }

    /// The underlying page
    #[must_use]
    pub const fn page(&self) -> &CdpPage {
        &self.page
    }

    /// Navigate the page
    pub async fn goto(&self, url: &str) -> PierceResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PierceError::driver(format!("navigating to {url}: {e}")))?;
        Ok(())
    }

    /// Close the browser if this driver launched it
    pub async fn close(mut self) -> PierceResult<()> {
        if let Some(browser) = self.browser.take() {
            browser
                .lock()
                .await
                .close()
                .await
                .map_err(|e| PierceError::driver(format!("closing chromium: {e}")))?;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[serde_json::Value],
        subject: &str,
    ) -> PierceResult<T> {
        let expr = script(method, args);
        trace!(method, subject, "evaluate");
        let reply: Reply = self
            .page
            .evaluate(expr)
            .await
            .map_err(|e| PierceError::driver(format!("{method} on {subject}: {e}")))?
            .into_value()
            .map_err(|e| PierceError::driver(format!("{method} on {subject}: {e}")))?;

        if reply.stale {
            return Err(PierceError::StaleElement {
                id: subject.to_string(),
            });
        }
        if let Some(message) = reply.error {
            return Err(if reply.invalid {
                PierceError::invalid_selector(subject, message)
            } else {
                PierceError::driver(format!("{method} on {subject}: {message}"))
            });
        }
        if !reply.done {
            return Err(PierceError::driver(format!("{method} on {subject}: no reply")));
        }
        serde_json::from_value(reply.value)
            .map_err(|e| PierceError::driver(format!("{method} on {subject}: {e}")))
    }
}

/// Helper install followed by one helper call
fn script(method: &str, args: &[serde_json::Value]) -> String {
    let args: Vec<String> = args.iter().map(serde_json::Value::to_string).collect();
    format!("{HELPER};\nglobalThis.__pierce.{method}({})", args.join(", "))
}

fn scope_arg(scope: &SearchScope) -> serde_json::Value {
    scope
        .handle()
        .map_or(serde_json::Value::Null, |h| serde_json::Value::from(h.id.as_str()))
}

fn id_arg(element: &ElementHandle) -> serde_json::Value {
    serde_json::Value::from(element.id.as_str())
}

#[async_trait]
impl Driver for CdpDriver {
    async fn find_elements(
        &self,
        scope: &SearchScope,
        css: &str,
    ) -> PierceResult<Vec<ElementHandle>> {
        let reply = self
            .call("find", &[scope_arg(scope), css.into()], css)
            .await;
        match reply {
            Err(PierceError::StaleElement { .. }) => Err(PierceError::StaleElement {
                id: scope.to_string(),
            }),
            other => other,
        }
    }

    async fn shadow_root(&self, element: &ElementHandle) -> PierceResult<Option<ElementHandle>> {
        self.call("shadow", &[id_arg(element)], &element.id).await
    }

    async fn shadow_hosts(&self, scope: &SearchScope) -> PierceResult<Vec<ElementHandle>> {
        self.call("hosts", &[scope_arg(scope)], &scope.to_string()).await
    }

    async fn set_value(&self, element: &ElementHandle, text: &str) -> PierceResult<()> {
        self.call("setValue", &[id_arg(element), text.into()], &element.id)
            .await
    }

    async fn click(&self, element: &ElementHandle) -> PierceResult<()> {
        self.call("click", &[id_arg(element)], &element.id).await
    }

    async fn is_displayed(&self, element: &ElementHandle) -> PierceResult<bool> {
        self.call("displayed", &[id_arg(element)], &element.id).await
    }

    async fn text(&self, element: &ElementHandle) -> PierceResult<String> {
        self.call("text", &[id_arg(element)], &element.id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_an_expression() {
        let s = script("find", &[serde_json::Value::Null, "input[name=\"q\"]".into()]);
        assert!(s.starts_with("globalThis.__pierce ="));
        assert!(s.ends_with("globalThis.__pierce.find(null, \"input[name=\\\"q\\\"]\")"));
    }

    #[test]
    fn test_registry_drops_disconnected_nodes() {
        assert!(HELPER.contains("this.nodes.delete(id)"));
        let find = HELPER.find("find(s, css)").unwrap();
        let sweep = HELPER[find..].find("this.sweep()").unwrap();
        let query = HELPER[find..].find("querySelectorAll").unwrap();
        assert!(sweep < query);
    }

    #[test]
    fn test_scope_arg() {
        assert_eq!(scope_arg(&SearchScope::Document), serde_json::Value::Null);
        let h = ElementHandle::new("h3", "#shadow-root");
        assert_eq!(scope_arg(&SearchScope::ShadowRoot(h)), serde_json::json!("h3"));
    }

    #[test]
    fn test_launch_options() {
        let o = LaunchOptions::default().with_no_sandbox().with_headless(false);
        assert!(!o.sandbox);
        assert!(!o.headless);
    }
}
