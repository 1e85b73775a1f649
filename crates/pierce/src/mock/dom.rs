//! In-memory element tree with attachable shadow roots.

use scraper::{Html, Selector};
use std::fmt::Write;

/// Index of a node in a [`MockDom`]
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Document,
    ShadowRoot,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        text: String,
        value: Option<String>,
        hidden: bool,
    },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    host: Option<NodeId>,
    attached: bool,
}

/// Declarative description of an element subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSpec {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    hidden: bool,
    children: Vec<NodeSpec>,
    shadow: Option<Vec<NodeSpec>>,
}

impl NodeSpec {
    /// Element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
        self
    }

    /// Append a class
    #[must_use]
    pub fn class(self, class: impl AsRef<str>) -> Self {
        let class = class.as_ref();
        let merged = match self.attrs.iter().find(|(n, _)| n == "class") {
            Some((_, existing)) => format!("{existing} {class}"),
            None => class.to_string(),
        };
        self.attr("class", merged)
    }

    /// Own text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Render hidden (`display: none`)
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Append a light-DOM child
    #[must_use]
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Append several light-DOM children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    /// Attach an open shadow root with these children
    #[must_use]
    pub fn shadow(mut self, children: Vec<NodeSpec>) -> Self {
        self.shadow = Some(children);
        self
    }
}

/// A document tree: elements, attributes, text, visibility, shadow roots.
#[derive(Debug, Clone)]
pub struct MockDom {
    nodes: Vec<Node>,
}

impl Default for MockDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDom {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                shadow_root: None,
                host: None,
                attached: true,
            }],
        }
    }

    /// Document whose body is the given subtrees
    #[must_use]
    pub fn from_specs(specs: Vec<NodeSpec>) -> Self {
        let mut dom = Self::new();
        for spec in specs {
            dom.append(dom.document(), spec);
        }
        dom
    }

    /// The document node
    #[must_use]
    pub const fn document(&self) -> NodeId {
        0
    }

    /// Whether `id` names a live (attached) node
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.attached)
    }

    /// Whether `id` is a shadow root
    #[must_use]
    pub fn is_shadow_root(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.kind == NodeKind::ShadowRoot)
    }

    /// Whether `id` is an element
    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| matches!(n.kind, NodeKind::Element { .. }))
    }

    /// Build `spec` under `parent` (light DOM); returns the new element
    pub fn append(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: spec.tag,
                attrs: spec.attrs,
                text: spec.text,
                value: None,
                hidden: spec.hidden,
            },
            parent: Some(parent),
            children: Vec::new(),
            shadow_root: None,
            host: None,
            attached: true,
        });
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(id);
        }
        for child in spec.children {
            self.append(id, child);
        }
        if let Some(shadow) = spec.shadow {
            self.attach_shadow(id, shadow);
        }
        id
    }

    /// Attach (or replace) the shadow root of `host`
    pub fn attach_shadow(&mut self, host: NodeId, children: Vec<NodeSpec>) -> NodeId {
        if let Some(old) = self.nodes.get(host).and_then(|n| n.shadow_root) {
            self.detach(old);
        }
        let root = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::ShadowRoot,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            host: Some(host),
            attached: true,
        });
        if let Some(h) = self.nodes.get_mut(host) {
            h.shadow_root = Some(root);
        }
        for child in children {
            self.append(root, child);
        }
        root
    }

    /// Remove `id` and its subtree from the tree
    pub fn remove(&mut self, id: NodeId) {
        if id == self.document() {
            return;
        }
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        self.detach(id);
    }

    /// Remove every light-DOM child of `id`
    pub fn clear_children(&mut self, id: NodeId) {
        let children = self
            .nodes
            .get_mut(id)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            self.detach(child);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current) {
                node.attached = false;
                stack.extend(node.children.iter().copied());
                stack.extend(node.shadow_root);
            }
        }
    }

    /// Tag name (`#document`, `#shadow-root` for non-elements)
    #[must_use]
    pub fn tag(&self, id: NodeId) -> &str {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { tag, .. }) => tag,
            Some(NodeKind::ShadowRoot) => "#shadow-root",
            _ => "#document",
        }
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Set an attribute
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            let name = name.to_ascii_lowercase();
            match attrs.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((name, value.to_string())),
            }
        }
    }

    /// Replace the element's own text
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { text, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            *text = value.to_string();
        }
    }

    /// Current form value
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element { value, .. }) => value.as_deref(),
            _ => None,
        }
    }

    /// Set the form value
    pub fn set_value(&mut self, id: NodeId, new_value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { value, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            *value = Some(new_value.to_string());
        }
    }

    /// Show or hide an element
    pub fn set_hidden(&mut self, id: NodeId, is_hidden: bool) {
        if let Some(Node {
            kind: NodeKind::Element { hidden, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            *hidden = is_hidden;
        }
    }

    /// Own text followed by the light-DOM text of descendants
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if let NodeKind::Element { text, .. } = &node.kind {
            if !text.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// Attached, and neither it nor any ancestor (across hosts) is hidden
    #[must_use]
    pub fn is_displayed(&self, id: NodeId) -> bool {
        if !self.is_live(id) || !self.is_element(id) {
            return false;
        }
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(node) = self.nodes.get(cur) else {
                return false;
            };
            if let NodeKind::Element { hidden: true, .. } = node.kind {
                return false;
            }
            current = node.parent.or(node.host);
        }
        true
    }

    /// Shadow root of `id`
    #[must_use]
    pub fn shadow_root(&self, id: NodeId) -> Option<NodeId> {
        self.nodes
            .get(id)
            .and_then(|n| n.shadow_root)
            .filter(|r| self.is_live(*r))
    }

    /// `scope.querySelectorAll(selector)`.
    ///
    /// The tree holding `scope` (the document, or one shadow root) is
    /// rendered to HTML and matched with `scraper`. Ancestors of `scope`
    /// inside that tree take part in matching; nothing crosses a shadow
    /// boundary. The HTML parser's content-model fixups apply, so trees the
    /// parser would restructure (a `form` inside a `form`, table content
    /// outside a `table`) do not match the way they are built.
    pub fn query_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, String> {
        let selector = parse_selector(selector)?;
        Ok(self
            .select_in_tree(self.tree_root(scope), &selector)
            .into_iter()
            .filter(|id| *id != scope && self.is_inclusive_ancestor(scope, *id))
            .collect())
    }

    /// First live element with this tag anywhere, shadow trees included
    #[must_use]
    pub fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        (0..self.nodes.len()).find(|id| self.is_live(*id) && self.tag(*id) == tag)
    }

    /// Every live element (any tree) matching `selector`, in creation order
    pub fn find_anywhere(&self, selector: &str) -> Result<Vec<NodeId>, String> {
        let selector = parse_selector(selector)?;
        let mut found: Vec<NodeId> = (0..self.nodes.len())
            .filter(|id| *id == self.document() || (self.is_shadow_root(*id) && self.is_live(*id)))
            .flat_map(|root| self.select_in_tree(root, &selector))
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    /// Document or shadow root containing `id`
    fn tree_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.nodes.get(current).and_then(|n| n.parent) {
            current = parent;
        }
        current
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.nodes.get(cur).and_then(|n| n.parent);
        }
        false
    }

    /// Elements of the tree under `root` matching `selector`, in document order
    fn select_in_tree(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut html = String::new();
        for child in self.nodes.get(root).map(|n| n.children.as_slice()).unwrap_or_default() {
            self.render(*child, &mut html);
        }
        let fragment = Html::parse_fragment(&html);
        fragment
            .select(selector)
            .filter_map(|element| element.value().attr(NODE_ATTR))
            .filter_map(|id| id.parse::<NodeId>().ok())
            .collect()
    }

    /// Light-DOM markup of `id`; shadow roots are separate trees
    fn render(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let NodeKind::Element {
            tag, attrs, text, ..
        } = &node.kind
        else {
            return;
        };
        let _ = write!(out, "<{tag} {NODE_ATTR}=\"{id}\"");
        for (name, value) in attrs {
            let _ = write!(out, " {name}=\"");
            escape_into(value, out);
            out.push('"');
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&tag.as_str()) {
            return;
        }
        escape_into(text, out);
        for child in &node.children {
            self.render(*child, out);
        }
        let _ = write!(out, "</{tag}>");
    }
}

/// Carries the arena index through the rendered markup
const NODE_ATTR: &str = "data-mock-node";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| e.to_string())
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
