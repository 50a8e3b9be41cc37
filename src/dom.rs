use crate::markup;
use askama::Html as HtmlEscaper;
use askama::MarkupDisplay;
use parking_lot::RwLock;
use std::sync::Arc;

/// Document shared between the page runtime and its async tasks.
///
/// Guards must never be held across an `.await`.
pub type SharedDocument = Arc<RwLock<Document>>;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn parse(html: &str) -> Self {
        let mut doc = Self::new();
        let root = doc.root();
        markup::parse_fragment(&mut doc, root, html);
        doc
    }

    pub fn into_shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(Element {
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Appends `child` to `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        node
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    pub fn empty(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replaces the children of `node` with a single text node.
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        self.empty(node);
        self.append_text(node, text);
    }

    /// Concatenated text of `node` and all of its descendants.
    pub fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Text(text) => out.push_str(text),
            _ => {
                for child in &self.nodes[node.0].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    /// Pre-order descendants of `node`, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].data, NodeData::Element(_))
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|element| {
            element
                .attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    /// Sets an attribute. `class` is routed to the class list.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let Some(element) = self.element_mut(node) else {
            return;
        };
        let name = name.to_ascii_lowercase();
        if name == "class" {
            element.classes = Vec::new();
            for class in value.split_whitespace() {
                if !element.classes.iter().any(|existing| existing == class) {
                    element.classes.push(class.to_string());
                }
            }
            return;
        }
        match element.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => element.attrs.push((name, value)),
        }
    }

    pub fn data(&self, node: NodeId, key: &str) -> Option<&str> {
        self.attr(node, &format!("data-{key}"))
    }

    pub fn classes(&self, node: NodeId) -> &[String] {
        self.element(node)
            .map(|element| element.classes.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|existing| existing == class)
    }

    /// Adds each whitespace-separated class that is not already present.
    pub fn add_class(&mut self, node: NodeId, classes: &str) {
        if let Some(element) = self.element_mut(node) {
            for class in classes.split_whitespace() {
                if !element.classes.iter().any(|existing| existing == class) {
                    element.classes.push(class.to_string());
                }
            }
        }
    }

    pub fn remove_class(&mut self, node: NodeId, classes: &str) {
        if let Some(element) = self.element_mut(node) {
            for class in classes.split_whitespace() {
                element.classes.retain(|existing| existing != class);
            }
        }
    }

    /// All descendants of `scope` matching `selector`, in document order.
    ///
    /// Ancestors outside `scope` still take part in matching, like
    /// `Element.querySelectorAll`. An unparsable selector matches nothing.
    pub fn select(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            tracing::debug!(selector, "ignoring unparsable selector");
            return Vec::new();
        };
        self.descendants(scope)
            .into_iter()
            .filter(|node| self.matches(*node, &selector))
            .collect()
    }

    pub fn select_first(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        let selector = Selector::parse(selector)?;
        self.descendants(scope)
            .into_iter()
            .find(|node| self.matches(*node, &selector))
    }

    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.matches_part(node, selector, selector.parts.len() - 1)
    }

    fn matches_part(&self, node: NodeId, selector: &Selector, index: usize) -> bool {
        let (combinator, compound) = &selector.parts[index];
        if !self.matches_compound(node, compound) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => self
                .parent(node)
                .is_some_and(|parent| self.matches_part(parent, selector, index - 1)),
            Combinator::Descendant => {
                let mut cursor = self.parent(node);
                while let Some(ancestor) = cursor {
                    if self.matches_part(ancestor, selector, index - 1) {
                        return true;
                    }
                    cursor = self.parent(ancestor);
                }
                false
            }
        }
    }

    fn matches_compound(&self, node: NodeId, compound: &Compound) -> bool {
        let Some(element) = self.element(node) else {
            return false;
        };
        if let Some(tag) = &compound.tag {
            if *tag != element.tag {
                return false;
            }
        }
        if let Some(id) = &compound.id {
            if self.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !compound
            .classes
            .iter()
            .all(|class| element.classes.iter().any(|existing| existing == class))
        {
            return false;
        }
        compound.attrs.iter().all(|(name, expected)| {
            let actual = if name == "class" {
                (!element.classes.is_empty()).then(|| element.classes.join(" "))
            } else {
                self.attr(node, name).map(str::to_string)
            };
            match (actual, expected) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, false, &mut out);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let raw = self
            .tag(node)
            .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, raw, &mut out);
        }
        out
    }

    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    fn write_html(&self, node: NodeId, raw_text: bool, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Root => out.push_str(&self.inner_html(node)),
            NodeData::Text(text) if raw_text => out.push_str(text),
            NodeData::Text(text) => out.push_str(&escape_html(text)),
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                if !element.classes.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(&escape_html(&element.classes.join(" ")));
                    out.push('"');
                }
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(&element.tag) {
                    return;
                }
                out.push_str(&self.inner_html(node));
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub(crate) fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

pub(crate) fn escape_html(value: &str) -> String {
    MarkupDisplay::new_unsafe(value, HtmlEscaper).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone)]
struct Selector {
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    fn parse(input: &str) -> Option<Self> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        let mut chars = input.trim().chars().peekable();
        while chars.peek().is_some() {
            match chars.peek() {
                Some(c) if c.is_whitespace() => {
                    chars.next();
                }
                Some('>') => {
                    chars.next();
                    if parts.is_empty() {
                        return None;
                    }
                    combinator = Combinator::Child;
                }
                Some(_) => {
                    let compound = parse_compound(&mut chars)?;
                    parts.push((combinator, compound));
                    combinator = Combinator::Descendant;
                }
                None => break,
            }
        }
        if parts.is_empty() || combinator == Combinator::Child {
            return None;
        }
        Some(Self { parts })
    }
}

fn parse_compound(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut consumed = false;
    loop {
        match chars.peek().copied() {
            Some('*') => {
                chars.next();
            }
            Some('.') => {
                chars.next();
                compound.classes.push(take_ident(chars)?);
            }
            Some('#') => {
                chars.next();
                compound.id = Some(take_ident(chars)?);
            }
            Some('[') => {
                chars.next();
                compound.attrs.push(parse_attr_selector(chars)?);
            }
            Some(c) if is_ident_char(c) && !consumed => {
                compound.tag = Some(take_ident(chars)?.to_ascii_lowercase());
            }
            _ => break,
        }
        consumed = true;
    }
    consumed.then_some(compound)
}

fn parse_attr_selector(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Option<(String, Option<String>)> {
    let name = take_ident(chars)?.to_ascii_lowercase();
    match chars.next()? {
        ']' => Some((name, None)),
        '=' => {
            let value = match chars.peek().copied() {
                Some(quote @ ('"' | '\'')) => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        let c = chars.next()?;
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                    value
                }
                _ => take_ident(chars)?,
            };
            (chars.next()? == ']').then_some((name, Some(value)))
        }
        _ => None,
    }
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(c) = chars.peek().copied() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    (!ident.is_empty()).then_some(ident)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse(
            r#"<div class="article" data-article="42">
                 <div class="versions">
                   <div data-version="5"><div class="loading fade in">Loading</div></div>
                   <div data-version="6"><span><div class="nested"></div></span></div>
                 </div>
               </div>
               <button id="id-toggle-button" class="btn">Show IDs</button>"#,
        )
    }

    #[test]
    fn child_combinator_only_matches_direct_children() {
        let doc = sample();
        let root = doc.root();
        let widgets = doc.select(root, ".versions > div");
        assert_eq!(widgets.len(), 2);
        assert_eq!(doc.data(widgets[0], "version"), Some("5"));
        assert_eq!(doc.data(widgets[1], "version"), Some("6"));
        assert_eq!(doc.select(root, ".versions div").len(), 4);
    }

    #[test]
    fn attribute_and_id_selectors() {
        let doc = sample();
        let root = doc.root();
        assert!(doc.select_first(root, ".article[data-article]").is_some());
        assert!(doc.select_first(root, ".article[data-category]").is_none());
        assert!(doc.select_first(root, "div[data-version='6']").is_some());
        let button = doc.select_first(root, "#id-toggle-button").unwrap();
        assert_eq!(doc.text(button), "Show IDs");
    }

    #[test]
    fn scoped_selection_can_match_through_outer_ancestors() {
        let doc = sample();
        let widget = doc.select(doc.root(), ".versions > div")[0];
        assert_eq!(doc.select(widget, ".article .loading").len(), 1);
    }

    #[test]
    fn class_mutation_is_deduplicated() {
        let mut doc = sample();
        let loading = doc.select_first(doc.root(), ".loading").unwrap();
        doc.add_class(loading, "in hidden");
        assert_eq!(doc.classes(loading), ["loading", "fade", "in", "hidden"]);
        doc.remove_class(loading, "in");
        assert!(!doc.has_class(loading, "in"));
        assert!(doc.has_class(loading, "hidden"));
    }

    #[test]
    fn set_text_replaces_children_and_escapes_on_output() {
        let mut doc = Document::new();
        let root = doc.root();
        let cell = doc.append_element(root, "td");
        doc.append_element(cell, "b");
        doc.set_text(cell, "a < b");
        assert_eq!(doc.children(cell).len(), 1);
        assert_eq!(doc.outer_html(cell), "<td>a &lt; b</td>");
    }

    #[test]
    fn invalid_selectors_match_nothing() {
        let doc = sample();
        assert!(doc.select(doc.root(), "> div").is_empty());
        assert!(doc.select(doc.root(), ".versions >").is_empty());
        assert!(doc.select(doc.root(), "[data-version").is_empty());
    }
}
