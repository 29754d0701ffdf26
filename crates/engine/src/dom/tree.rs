// ABOUTME: The DocumentTree trait: the narrow tree interface every engine component queries through.
// ABOUTME: Provides ancestor/descendant walks, closest-match lookup and node descriptions on top of a few primitives.

//! Tree adapter abstraction.
//!
//! The engine never touches a concrete DOM. It asks a [`DocumentTree`] for
//! parents, element children, attributes and text, and delegates selector
//! matching to the implementation. [`crate::dom::html::HtmlTree`] is the
//! implementation over a parsed HTML document.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::DetectError;

/// A read-only, element-only view of a tree-structured document.
///
/// Implementations only need to expose element nodes; text nodes are surfaced
/// through [`DocumentTree::direct_text`] and [`DocumentTree::text`].
pub trait DocumentTree {
    /// Stable node identity. Two handles are equal iff they name the same node.
    type Node: Copy + Eq + Hash + Debug;

    /// The document's root element.
    fn root(&self) -> Self::Node;

    /// The parent element, or `None` at the root.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Element children in document order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Lowercase tag name.
    fn tag_name(&self, node: Self::Node) -> String;

    /// Attribute value by name.
    fn attr(&self, node: Self::Node, name: &str) -> Option<String>;

    /// All attributes as `(name, value)` pairs.
    fn attributes(&self, node: Self::Node) -> Vec<(String, String)>;

    /// Whitespace-normalized text of the node's own text children only.
    fn direct_text(&self, node: Self::Node) -> String;

    /// Whitespace-normalized text of the whole subtree, excluding script and style.
    fn text(&self, node: Self::Node) -> String;

    /// Whether `node` itself matches `selector`.
    fn matches(&self, node: Self::Node, selector: &str) -> Result<bool, DetectError>;

    /// Descendants of `scope` (excluding `scope`) matching `selector`, in document order.
    fn select(&self, scope: Self::Node, selector: &str) -> Result<Vec<Self::Node>, DetectError>;

    /// Proper ancestors from the parent up to the root.
    fn ancestors(&self, node: Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    /// All descendant elements of `node` in document (pre-)order, excluding `node`.
    fn descendants(&self, node: Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Self::Node> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    /// Number of element ancestors; the root has depth 0.
    fn depth(&self, node: Self::Node) -> usize {
        self.ancestors(node).len()
    }

    /// The nearest node matching `selector`, starting at `node` itself and
    /// walking at most `max_steps` parents up.
    fn closest(
        &self,
        node: Self::Node,
        selector: &str,
        max_steps: usize,
    ) -> Result<Option<Self::Node>, DetectError> {
        let mut current = Some(node);
        let mut steps = 0;
        while let Some(candidate) = current {
            if self.matches(candidate, selector)? {
                return Ok(Some(candidate));
            }
            if steps == max_steps {
                break;
            }
            steps += 1;
            current = self.parent(candidate);
        }
        Ok(None)
    }

    /// Short CSS-like description, e.g. `article#post-1.feed-item`.
    fn describe(&self, node: Self::Node) -> String {
        let mut out = self.tag_name(node);
        if let Some(id) = self.attr(node, "id").filter(|id| !id.trim().is_empty()) {
            out.push('#');
            out.push_str(id.trim());
        }
        if let Some(class) = self.attr(node, "class") {
            for name in class.split_whitespace() {
                out.push('.');
                out.push_str(name);
            }
        }
        out
    }

    /// Tag path from the root, e.g. `html > body > div > article`.
    fn tag_path(&self, node: Self::Node) -> String {
        let mut tags: Vec<String> = self
            .ancestors(node)
            .into_iter()
            .map(|n| self.tag_name(n))
            .collect();
        tags.reverse();
        tags.push(self.tag_name(node));
        tags.join(" > ")
    }
}
