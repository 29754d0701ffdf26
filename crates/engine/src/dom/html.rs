// ABOUTME: HtmlTree, the DocumentTree implementation over a scraper::Html document.
// ABOUTME: Uses ego_tree NodeIds as node identity and the compiled selector cache for matching.

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node};

use crate::dom::compiled::get_or_compile;
use crate::dom::text::normalize_whitespace;
use crate::dom::tree::DocumentTree;
use crate::error::DetectError;

/// Tags whose text never counts as visible content.
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// A parsed HTML document exposed through [`DocumentTree`].
#[derive(Debug, Clone)]
pub struct HtmlTree {
    html: Html,
}

impl HtmlTree {
    /// Parses a full HTML document.
    pub fn parse_document(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Parses an HTML fragment. The fragment is wrapped in an `html` root element.
    pub fn parse_fragment(source: &str) -> Self {
        Self {
            html: Html::parse_fragment(source),
        }
    }

    /// Wraps an already parsed document.
    pub fn from_html(html: Html) -> Self {
        Self { html }
    }

    /// The underlying scraper document.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Returns the node ids of all elements matching `selector` anywhere in the document.
    pub fn query(&self, selector: &str) -> Result<Vec<NodeId>, DetectError> {
        let sel = get_or_compile(selector)?;
        Ok(self.html.select(&sel).map(|el| el.id()).collect())
    }

    fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }
}

fn is_non_content(node: NodeRef<'_, Node>) -> bool {
    node.value()
        .as_element()
        .map(|el| NON_CONTENT_TAGS.contains(&el.name().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(&text.text);
                out.push(' ');
            }
            Node::Element(_) if !is_non_content(child) => collect_text(child, out),
            _ => {}
        }
    }
}

impl DocumentTree for HtmlTree {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.html.root_element().id()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        let node_ref = self.html.tree.get(node)?;
        let parent = node_ref.parent()?;
        if parent.value().is_element() {
            Some(parent.id())
        } else {
            None
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        match self.html.tree.get(node) {
            Some(node_ref) => node_ref
                .children()
                .filter(|c| c.value().is_element())
                .map(|c| c.id())
                .collect(),
            None => Vec::new(),
        }
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.element(node)
            .map(|el| el.value().name().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?
            .value()
            .attr(name)
            .map(|v| v.to_string())
    }

    fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        match self.element(node) {
            Some(el) => el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            None => Vec::new(),
        }
    }

    fn direct_text(&self, node: NodeId) -> String {
        let node_ref = match self.html.tree.get(node) {
            Some(n) => n,
            None => return String::new(),
        };
        let mut raw = String::new();
        for child in node_ref.children() {
            if let Node::Text(text) = child.value() {
                raw.push_str(&text.text);
                raw.push(' ');
            }
        }
        normalize_whitespace(&raw)
    }

    fn text(&self, node: NodeId) -> String {
        let node_ref = match self.html.tree.get(node) {
            Some(n) => n,
            None => return String::new(),
        };
        let mut raw = String::new();
        collect_text(node_ref, &mut raw);
        normalize_whitespace(&raw)
    }

    fn matches(&self, node: NodeId, selector: &str) -> Result<bool, DetectError> {
        let sel = get_or_compile(selector)?;
        Ok(self.element(node).map(|el| sel.matches(&el)).unwrap_or(false))
    }

    fn select(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DetectError> {
        let sel = get_or_compile(selector)?;
        Ok(match self.element(scope) {
            Some(el) => el.select(&sel).map(|m| m.id()).collect(),
            None => Vec::new(),
        })
    }
}
