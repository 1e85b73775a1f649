//! Selector model: CSS stages separated by the shadow-piercing marker.
//!
//! A selector such as
//!
//! ```text
//! ak-flow-search[name="authorizationFlow"] >>> input[type="text"]
//! ```
//!
//! is split into two stages. The first is matched in the light DOM of the
//! starting root; every stage after a `>>>` marker is matched inside the
//! previous matches *and* every shadow root reachable beneath them. A
//! selector that starts with the marker pierces from its first stage.
//!
//! Option templates (`button*=default`, `li=Exact label`) extend a selector
//! with a text filter, as used by the search-select interaction.

use std::fmt;
use std::str::FromStr;

use crate::result::{PierceError, PierceResult};

/// Marker splitting a selector into shadow-piercing stages
pub const PIERCE_MARKER: &str = ">>>";

/// One stage of a [`Selector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    css: String,
    pierces: bool,
}

impl Stage {
    /// Plain CSS matched at this stage
    #[must_use]
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Whether matching descends into shadow roots
    #[must_use]
    pub const fn pierces(&self) -> bool {
        self.pierces
    }
}

/// Parsed, immutable selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    stages: Vec<Stage>,
}

impl Selector {
    /// Parse a selector string
    ///
    /// # Errors
    ///
    /// Returns [`PierceError::InvalidSelector`] for empty selectors, empty
    /// stages, a trailing marker, or unbalanced brackets and quotes.
    pub fn parse(raw: &str) -> PierceResult<Self> {
        let segments = split_top_level(raw, PIERCE_MARKER)?;

        let mut leading_marker = false;
        let mut stages = Vec::with_capacity(segments.len());
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let css = segment.trim();
            if css.is_empty() {
                if i == 0 && last > 0 {
                    leading_marker = true;
                    continue;
                }
                let reason = if last == 0 {
                    "empty selector"
                } else if i == last {
                    "trailing piercing marker"
                } else {
                    "empty stage between piercing markers"
                };
                return Err(PierceError::invalid_selector(raw, reason));
            }
            stages.push(Stage {
                css: css.to_string(),
                pierces: i > 0 || leading_marker,
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            stages,
        })
    }

    /// Selector as written
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Stages in matching order
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Whether any stage crosses shadow boundaries
    #[must_use]
    pub fn is_piercing(&self) -> bool {
        self.stages.iter().any(Stage::pierces)
    }

    /// Same selector, but the first stage also pierces
    #[must_use]
    pub fn piercing(mut self) -> Self {
        if let Some(first) = self.stages.first_mut() {
            if !first.pierces {
                first.pierces = true;
                self.raw = format!("{PIERCE_MARKER}{}", self.raw);
            }
        }
        self
    }
}

impl FromStr for Selector {
    type Err = PierceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How an option label is compared with the filter text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Label contains the text (`css*=text`)
    Contains(String),
    /// Label equals the text (`css=text`)
    Exact(String),
}

impl TextMatch {
    /// The text to type into a search box
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Contains(t) | Self::Exact(t) => t,
        }
    }

    /// Compare against a rendered label (whitespace-normalized)
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_label(label);
        match self {
            Self::Contains(t) => label.contains(t.as_str()),
            Self::Exact(t) => label == *t,
        }
    }
}

/// Selector plus text filter, e.g. `button*=default`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTemplate {
    raw: String,
    selector: Selector,
    text: TextMatch,
}

impl OptionTemplate {
    /// Parse an option template
    ///
    /// # Errors
    ///
    /// Returns [`PierceError::InvalidSelector`] when the template has no
    /// top-level `=`/`*=`, an empty text filter, or an invalid selector part.
    pub fn parse(raw: &str) -> PierceResult<Self> {
        let Some(eq) = find_top_level(raw, '=')? else {
            return Err(PierceError::invalid_selector(
                raw,
                "option template needs a text filter (`css*=text` or `css=text`)",
            ));
        };

        let (css, contains) = match raw[..eq].strip_suffix('*') {
            Some(css) => (css, true),
            None => (&raw[..eq], false),
        };
        let text = normalize_label(&raw[eq + 1..]);
        if text.is_empty() {
            return Err(PierceError::invalid_selector(raw, "empty text filter"));
        }

        let selector = Selector::parse(css)?;
        let text = if contains {
            TextMatch::Contains(text)
        } else {
            TextMatch::Exact(text)
        };

        Ok(Self {
            raw: raw.to_string(),
            selector,
            text,
        })
    }

    /// Template as written
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Element part of the template
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Text part of the template
    #[must_use]
    pub const fn text(&self) -> &TextMatch {
        &self.text
    }

    /// Text typed into the search input
    #[must_use]
    pub fn filter_text(&self) -> &str {
        self.text.text()
    }
}

impl fmt::Display for OptionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Quote a value for use inside a CSS attribute selector
#[must_use]
pub fn quote_css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Trim and collapse internal whitespace runs to single spaces
#[must_use]
pub fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lexer state shared by the top-level scanners below
#[derive(Debug, Default)]
struct Scan {
    brackets: usize,
    parens: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Scan {
    /// Feed one char; returns false if the char closes something never opened
    fn feed(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return true;
        }
        if c == '\\' {
            self.escaped = true;
            return true;
        }
        if let Some(q) = self.quote {
            if c == q {
                self.quote = None;
            }
            return true;
        }
        match c {
            '"' | '\'' => self.quote = Some(c),
            '[' => self.brackets += 1,
            '(' => self.parens += 1,
            ']' => {
                if self.brackets == 0 {
                    return false;
                }
                self.brackets -= 1;
            }
            ')' => {
                if self.parens == 0 {
                    return false;
                }
                self.parens -= 1;
            }
            _ => {}
        }
        true
    }

    const fn at_top_level(&self) -> bool {
        self.brackets == 0 && self.parens == 0 && self.quote.is_none() && !self.escaped
    }

    fn finish(&self, raw: &str) -> PierceResult<()> {
        if self.quote.is_some() {
            return Err(PierceError::invalid_selector(raw, "unterminated string"));
        }
        if self.brackets > 0 {
            return Err(PierceError::invalid_selector(raw, "unclosed `[`"));
        }
        if self.parens > 0 {
            return Err(PierceError::invalid_selector(raw, "unclosed `(`"));
        }
        Ok(())
    }
}

fn split_top_level<'a>(raw: &'a str, marker: &str) -> PierceResult<Vec<&'a str>> {
    let mut scan = Scan::default();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut skip_until = 0;

    for (i, c) in raw.char_indices() {
        if i < skip_until {
            continue;
        }
        if scan.at_top_level() && raw[i..].starts_with(marker) {
            segments.push(&raw[start..i]);
            start = i + marker.len();
            skip_until = start;
            continue;
        }
        if !scan.feed(c) {
            return Err(PierceError::invalid_selector(raw, format!("unbalanced `{c}`")));
        }
    }
    scan.finish(raw)?;
    segments.push(&raw[start..]);
    Ok(segments)
}

fn find_top_level(raw: &str, needle: char) -> PierceResult<Option<usize>> {
    let mut scan = Scan::default();
    for (i, c) in raw.char_indices() {
        if c == needle && scan.at_top_level() {
            return Ok(Some(i));
        }
        if !scan.feed(c) {
            return Err(PierceError::invalid_selector(raw, format!("unbalanced `{c}`")));
        }
    }
    scan.finish(raw)?;
    Ok(None)
}
