//! Pierce Derive Macros: Declarative Page Objects
//!
//! `#[derive(Page)]` turns a marker struct plus a list of named selectors into
//! a [`pierce::Page`] implementation with one getter per selector:
//!
//! ```ignore
//! use pierce::Page;
//!
//! #[derive(Debug, Default, Page)]
//! #[page(name = "forward-proxy-form")]
//! #[page(locator(name_input = ">>>input[name=\"name\"]"))]
//! #[page(locator(external_host = ">>>input[name=\"externalHost\"]"))]
//! struct ProviderForwardProxyForm;
//!
//! // Generated:
//! // impl pierce::Page for ProviderForwardProxyForm { fn name(&self) -> &'static str { "forward-proxy-form" } ... }
//! // impl ProviderForwardProxyForm { pub fn external_host(&self) -> pierce::Locator { ... } }
//! ```
//!
//! Selectors are checked for empty piercing stages (`a >>> >>> b`,
//! trailing `>>>`) at compile time, so a typo fails the build instead of the
//! test run.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Ident, LitStr};

const PIERCE_MARKER: &str = ">>>";

/// Derive macro for page objects.
///
/// # Attributes
///
/// - `#[page(name = "...")]` - Page name used in logs (defaults to kebab-case
///   of the type name)
/// - `#[page(locator(getter = "selector"), ...)]` - Generate
///   `fn getter(&self) -> pierce::Locator`
///
/// Several `#[page(...)]` attributes may be stacked.
#[proc_macro_derive(Page, attributes(page))]
pub fn derive_page(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_page(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_page(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let parsed = parse_page_attributes(&input.attrs)?;
    let page_name = parsed
        .name
        .unwrap_or_else(|| to_kebab_case(&name.to_string()));

    let getters = parsed.locators.iter().map(|(getter, selector)| {
        let doc = format!("Locator for `{}`", selector.value());
        quote! {
            #[doc = #doc]
            #[must_use]
            pub fn #getter(&self) -> ::pierce::Locator {
                ::pierce::Locator::new(#selector)
            }
        }
    });
    let table = parsed.locators.iter().map(|(getter, selector)| {
        let getter = getter.to_string();
        quote! { (#getter, #selector) }
    });

    Ok(quote! {
        impl #impl_generics ::pierce::Page for #name #ty_generics #where_clause {
            fn name(&self) -> &'static str {
                #page_name
            }

            fn locators(&self) -> &'static [(&'static str, &'static str)] {
                &[#(#table),*]
            }
        }

        impl #impl_generics #name #ty_generics #where_clause {
            /// Page name (as reported in logs)
            pub const PAGE_NAME: &'static str = #page_name;

            #(#getters)*
        }
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

#[derive(Default)]
struct PageAttrs {
    name: Option<String>,
    locators: Vec<(Ident, LitStr)>,
}

/// Collect every `#[page(...)]` attribute
fn parse_page_attributes(attrs: &[Attribute]) -> syn::Result<PageAttrs> {
    let mut parsed = PageAttrs::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident("page")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().trim().is_empty() {
                    return Err(syn::Error::new(lit.span(), "page name must not be empty"));
                }
                parsed.name = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("locator") {
                meta.parse_nested_meta(|locator| {
                    let getter = locator
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| locator.error("expected a getter name"))?;
                    let selector: LitStr = locator.value()?.parse()?;
                    if let Err(reason) = check_selector(&selector.value()) {
                        return Err(syn::Error::new(selector.span(), reason));
                    }
                    if parsed.locators.iter().any(|(existing, _)| *existing == getter) {
                        return Err(syn::Error::new(
                            getter.span(),
                            format!("duplicate locator `{getter}`"),
                        ));
                    }
                    parsed.locators.push((getter, selector));
                    Ok(())
                })
            } else {
                Err(meta.error("expected `name = \"...\"` or `locator(getter = \"...\")`"))
            }
        })?;
    }

    if parsed.name.is_none()
        && parsed.locators.is_empty()
        && attrs.iter().any(|a| a.path().is_ident("page"))
    {
        return Err(syn::Error::new(Span::call_site(), "empty #[page] attribute"));
    }
    Ok(parsed)
}

/// Reject selectors with an empty stage around a piercing marker
fn check_selector(selector: &str) -> Result<(), String> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err("selector must not be empty".to_string());
    }
    for (index, stage) in trimmed.split(PIERCE_MARKER).enumerate() {
        let leading_marker = index == 0 && trimmed.starts_with(PIERCE_MARKER);
        if stage.trim().is_empty() && !leading_marker {
            return Err(format!("selector {selector:?} has an empty stage at position {index}"));
        }
    }
    Ok(())
}

/// Convert PascalCase to kebab-case.
///
/// A run of capitals is one word, split before its last capital when a
/// lowercase letter follows (`SAMLProvider` -> `saml-provider`).
fn to_kebab_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let word_start = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if word_start {
                result.push('-');
            }
        }
        result.push(c.to_ascii_lowercase());
    }

    result
}
