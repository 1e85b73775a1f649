//! End-to-end page object tests: a forward-proxy provider form whose
//! authorization flow is picked through a searchable dropdown.

#![allow(clippy::unwrap_used, clippy::panic)]

use pierce::mock::{MockDom, MockDriver, NodeSpec};
use pierce::{
    FailureKind, FakeClock, Page, PierceConfig, PierceError, PierceResult, SelectedOption,
    Session, WaitOptions,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Page)]
#[page(name = "forward-proxy-form")]
#[page(locator(name_input = ">>>input[name=\"name\"]"))]
#[page(locator(external_host = ">>>input[name=\"externalHost\"]"))]
#[page(locator(flow_search = "ak-provider-proxy-form >>> ak-flow-search[name=\"authorizationFlow\"]"))]
struct ProviderForwardProxyForm;

impl ProviderForwardProxyForm {
    async fn set_authorization_flow(
        &self,
        session: &Session,
        label: &str,
    ) -> PierceResult<SelectedOption> {
        self.search_select(
            session,
            ">>>ak-flow-search[name=\"authorizationFlow\"]",
            "authorizationFlow",
            &format!("button*={label}"),
        )
        .await
    }
}

const FLOWS: &[&str] = &[
    "default-provider-authorization-explicit-consent",
    "default-provider-authorization-implicit-consent",
    "custom-authorization",
];

/// Provider form rendered like the admin UI: form host, nested flow-search
/// component, options filled 300ms after each keystroke.
fn provider_form(with_external_host: bool) -> (Session, Arc<MockDriver>, Arc<FakeClock>) {
    let mut fields = vec![NodeSpec::new("input").attr("name", "name")];
    if with_external_host {
        fields.push(NodeSpec::new("input").attr("name", "externalHost"));
    }
    fields.push(
        NodeSpec::new("ak-flow-search")
            .attr("name", "authorizationFlow")
            .shadow(vec![
                NodeSpec::new("input")
                    .attr("type", "text")
                    .attr("name", "authorizationFlow"),
                NodeSpec::new("div").class("pf-c-menu").hidden(),
            ]),
    );
    let dom = MockDom::from_specs(vec![NodeSpec::new("ak-provider-proxy-form")
        .shadow(vec![NodeSpec::new("form").children(fields)])]);

    let clock = Arc::new(FakeClock::new());
    let driver = Arc::new(MockDriver::new(dom, clock.clone()));
    driver.on_input(Duration::from_millis(300), |dom, _, typed| {
        let Some(menu) = dom.first_by_tag("div") else {
            return;
        };
        dom.clear_children(menu);
        for flow in FLOWS.iter().filter(|f| f.contains(typed)) {
            dom.append(menu, NodeSpec::new("button").class("pf-c-menu__item").text(*flow));
        }
        dom.set_hidden(menu, false);
    });

    let config = PierceConfig::default().with_search(
        WaitOptions::new()
            .with_timeout(5_000)
            .with_poll_interval(250),
    );
    let session = Session::new(driver.clone())
        .with_clock(clock.clone())
        .with_config(config);
    (session, driver, clock)
}

#[tokio::test]
async fn test_selects_default_authorization_flow() {
    let (session, driver, clock) = provider_form(true);
    let form = ProviderForwardProxyForm::shared();

    let picked = form.set_authorization_flow(&session, "default").await.unwrap();

    assert_eq!(picked.label, "default-provider-authorization-explicit-consent");
    assert_eq!(driver.clicks().last(), Some(&picked.element));
    assert!(picked.elapsed <= Duration::from_millis(5_000));
    assert!(clock.now_ms() < 5_000);
}

#[tokio::test]
async fn test_unknown_flow_times_out_within_bound() {
    let (session, _, clock) = provider_form(true);
    let err = ProviderForwardProxyForm::shared()
        .set_authorization_flow(&session, "does-not-exist")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Timeout);
    let waited = clock.now_ms();
    assert!((5_000..=5_250).contains(&waited), "waited {waited}ms");
}

#[tokio::test]
async fn test_external_host_getter() {
    let (session, driver, _) = provider_form(true);
    let form = ProviderForwardProxyForm::shared();

    form.external_host()
        .set_value(&session, "https://proxy.example.com")
        .await
        .unwrap();
    let input = form.external_host().resolve1(&session).await.unwrap();
    assert_eq!(
        driver.value(&input).as_deref(),
        Some("https://proxy.example.com")
    );
}

#[tokio::test]
async fn test_external_host_absent_is_not_found() {
    let (session, _, _) = provider_form(false);
    let err = ProviderForwardProxyForm::shared()
        .external_host()
        .resolve1(&session)
        .await
        .unwrap_err();
    match err {
        PierceError::NotFound { selector, stage, .. } => {
            assert_eq!(selector, ">>>input[name=\"externalHost\"]");
            assert_eq!(stage, 0);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_staged_getter_reaches_nested_component() {
    let (session, _, _) = provider_form(true);
    let host = ProviderForwardProxyForm::shared()
        .flow_search()
        .resolve1(&session)
        .await;
    assert!(host.is_ok());
}

#[test]
fn test_derived_page_metadata() {
    let form = ProviderForwardProxyForm::shared();
    assert_eq!(form.name(), "forward-proxy-form");
    assert_eq!(ProviderForwardProxyForm::PAGE_NAME, "forward-proxy-form");
    let getters: Vec<_> = form.locators().iter().map(|(g, _)| *g).collect();
    assert_eq!(getters, vec!["name_input", "external_host", "flow_search"]);
    assert!(std::ptr::eq(form, pierce::shared::<ProviderForwardProxyForm>()));
    assert!(pierce::registered_pages().contains(&"forward-proxy-form"));
}

/// Wrap `leaf` in `depth` custom elements, each behind its own shadow root
fn nested(depth: usize, leaf: NodeSpec) -> NodeSpec {
    (0..depth).fold(leaf, |inner, level| {
        NodeSpec::new(format!("x-level-{level}")).shadow(vec![inner])
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_piercing_is_depth_independent(depth in 0usize..8) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let leaf = NodeSpec::new("input").attr("name", "externalHost");
        let dom = MockDom::from_specs(vec![nested(depth, leaf)]);
        let clock = Arc::new(FakeClock::new());
        let session = Session::new(Arc::new(MockDriver::new(dom, clock.clone()))).with_clock(clock);

        let found = rt.block_on(
            ProviderForwardProxyForm::shared().external_host().resolve(&session),
        ).unwrap();
        prop_assert_eq!(found.len(), 1);
        prop_assert_eq!(found[0].tag_name.as_str(), "input");
    }
}
