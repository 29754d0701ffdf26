// ABOUTME: Label-proximity locator: finds disclosure labels ("Sponsored", "Promoted") and walks up to their container.
// ABOUTME: Confidence reflects how far below the container boundary the label text sits; aria hits are discounted.

//! Label-led container detection.
//!
//! Two strategies produce label hits:
//!
//! 1. Text: an element whose own text carries the label is a direct hit
//!    (confidence 1.0). A wrapper whose whole text is nothing but the label,
//!    held by nested children, is a nested hit, scored by how deep the
//!    label text sits: depth <= 2 -> 0.9, <= 4 -> 0.8, deeper -> 0.7.
//! 2. Attributes: `aria-label` / `aria-description` carrying the label
//!    (confidence = the aria factor, 0.95 by default).
//!
//! Only label-sized text counts, so a paragraph that happens to contain the
//! word "promoted" is not a disclosure. From every hit the locator walks up
//! (the hit itself included) to the closest `containerSelector` match or, when
//! the rule has none, to the first element that looks like a container.
//!
//! Once the container is known, a text hit is rescored by the depth of the
//! label-bearing node below it, using the same buckets. A label in the
//! container's own text keeps 1.0; one buried in a quoted reply five levels
//! down drops to 0.7. The label-bearing node becomes the match's `label_node`.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::dom::distance::steps_up;
use crate::dom::text::LabelMatcher;
use crate::dom::tree::DocumentTree;
use crate::error::DetectError;
use crate::options::DetectorOptions;
use crate::result::ContainerMatch;

/// Elements whose text is never a disclosure label.
const SKIP_TAGS: &[&str] = &[
    "head", "title", "meta", "script", "style", "noscript", "template",
];
/// Attributes searched by the second strategy.
const ARIA_LABEL_ATTRS: &[&str] = &["aria-label", "aria-description"];
/// Elements that never qualify as an ad container.
const NEVER_CONTAINER_TAGS: &[&str] = &["html", "head", "body"];
/// Elements that qualify as containers on their own.
const SEMANTIC_CONTAINER_TAGS: &[&str] = &["article", "section"];
/// Generic wrappers that qualify when they carry an identifying attribute.
const GENERIC_CONTAINER_TAGS: &[&str] = &["div", "li", "aside"];
/// Text-level elements never counted as containers by child count.
const INLINE_TAGS: &[&str] = &[
    "a", "b", "i", "em", "strong", "small", "span", "label", "button", "p", "h1", "h2", "h3",
    "h4", "h5", "h6",
];
const MIN_CONTAINER_CHILDREN: usize = 2;
const MAX_CONTAINER_CHILDREN: usize = 20;

/// A node carrying a disclosure label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelHit<N> {
    pub node: N,
    pub confidence: f64,
    pub via_aria: bool,
}

/// Confidence for a label found `depth` levels below the hit node.
pub fn depth_confidence(depth: usize) -> f64 {
    match depth {
        0 => 1.0,
        1..=2 => 0.9,
        3..=4 => 0.8,
        _ => 0.7,
    }
}

/// Shallowest descendant of `node` whose own text carries a label, with its depth.
fn nested_carrier<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    matcher: &LabelMatcher,
) -> Option<(T::Node, usize)> {
    let mut queue: VecDeque<(T::Node, usize)> =
        tree.children(node).into_iter().map(|c| (c, 1)).collect();
    while let Some((current, depth)) = queue.pop_front() {
        if matcher.is_match(&tree.direct_text(current)) {
            return Some((current, depth));
        }
        queue.extend(tree.children(current).into_iter().map(|c| (c, depth + 1)));
    }
    None
}

/// The node holding the label text of `hit`.
///
/// Direct and aria hits carry it themselves. A nested hit is carried by its
/// shallowest matching descendant, or by the wrapper when the label is split
/// across elements.
pub fn label_carrier<T: DocumentTree>(
    tree: &T,
    hit: &LabelHit<T::Node>,
    matcher: &LabelMatcher,
) -> T::Node {
    if hit.via_aria || matcher.is_match(&tree.direct_text(hit.node)) {
        return hit.node;
    }
    nested_carrier(tree, hit.node, matcher)
        .map(|(node, _)| node)
        .unwrap_or(hit.node)
}

/// Confidence of `hit` once its container is resolved.
///
/// Aria hits keep the aria factor. Text hits score by the carrier's depth
/// below `container`, never above the hit's own confidence.
pub fn container_label_confidence<T: DocumentTree>(
    tree: &T,
    hit: &LabelHit<T::Node>,
    carrier: T::Node,
    container: T::Node,
) -> f64 {
    if hit.via_aria {
        return hit.confidence;
    }
    let depth = steps_up(tree, carrier, container).unwrap_or(usize::MAX);
    depth_confidence(depth).min(hit.confidence)
}

fn label_sized(text: &str, max_len: usize) -> bool {
    !text.is_empty() && text.chars().count() <= max_len
}

/// Finds every label hit in the tree, in document order.
pub fn find_label_hits<T: DocumentTree>(
    tree: &T,
    matcher: &LabelMatcher,
    opts: &DetectorOptions,
) -> Vec<LabelHit<T::Node>> {
    let mut hits = Vec::new();

    for node in tree.descendants(tree.root()) {
        let tag = tree.tag_name(node);
        if SKIP_TAGS.contains(&tag.as_str()) {
            continue;
        }

        let direct = tree.direct_text(node);
        if label_sized(&direct, opts.max_label_text_len) && matcher.is_match(&direct) {
            hits.push(LabelHit {
                node,
                confidence: 1.0,
                via_aria: false,
            });
            continue;
        }

        let full = tree.text(node);
        if label_sized(&full, opts.max_label_text_len) && matcher.is_exact(&full) {
            // None: the label is split across elements, score it as deeply nested
            let confidence = nested_carrier(tree, node, matcher)
                .map(|(_, depth)| depth_confidence(depth))
                .unwrap_or_else(|| depth_confidence(usize::MAX));
            hits.push(LabelHit {
                node,
                confidence,
                via_aria: false,
            });
            continue;
        }

        let aria_hit = ARIA_LABEL_ATTRS.iter().any(|attr| {
            tree.attr(node, attr)
                .map(|v| label_sized(v.trim(), opts.max_label_text_len) && matcher.is_match(&v))
                .unwrap_or(false)
        });
        if aria_hit {
            hits.push(LabelHit {
                node,
                confidence: opts.aria_label_factor,
                via_aria: true,
            });
        }
    }

    hits
}

/// Heuristic container test used when a rule has no container selector.
pub fn looks_like_container<T: DocumentTree>(tree: &T, node: T::Node) -> bool {
    let tag = tree.tag_name(node);
    let tag = tag.as_str();
    if NEVER_CONTAINER_TAGS.contains(&tag) {
        return false;
    }
    if SEMANTIC_CONTAINER_TAGS.contains(&tag) {
        return true;
    }
    if GENERIC_CONTAINER_TAGS.contains(&tag) {
        let identified = tree.attributes(node).iter().any(|(name, value)| {
            let name = name.to_ascii_lowercase();
            let named = matches!(name.as_str(), "data-testid" | "role" | "id");
            (named && !value.trim().is_empty()) || name.starts_with("data-ad")
        });
        if identified {
            return true;
        }
    }
    if INLINE_TAGS.contains(&tag) {
        return false;
    }
    let content_children = tree
        .children(node)
        .into_iter()
        .filter(|c| !matches!(tree.tag_name(*c).as_str(), "script" | "style"))
        .count();
    (MIN_CONTAINER_CHILDREN..=MAX_CONTAINER_CHILDREN).contains(&content_children)
}

/// Walks up from a label hit to its container.
pub fn container_for_hit<T: DocumentTree>(
    tree: &T,
    hit: T::Node,
    container_selector: Option<&str>,
    max_depth: usize,
) -> Result<Option<T::Node>, DetectError> {
    if let Some(selector) = container_selector {
        return tree.closest(hit, selector, max_depth);
    }

    let mut current = Some(hit);
    let mut steps = 0;
    while let Some(node) = current {
        if looks_like_container(tree, node) {
            return Ok(Some(node));
        }
        if steps == max_depth {
            break;
        }
        steps += 1;
        current = tree.parent(node);
    }
    Ok(None)
}

/// Runs a label-led rule: label hits, container walk, `score * label confidence`.
///
/// Each container appears once, with its best-scoring label; on ties the
/// first label in document order wins. An invalid
/// container selector is returned as an error for the caller to contain.
pub fn find_by_label<T: DocumentTree>(
    tree: &T,
    rule_id: &str,
    label_texts: &[String],
    container_selector: Option<&str>,
    score: f64,
    opts: &DetectorOptions,
) -> Result<Vec<ContainerMatch<T::Node>>, DetectError> {
    let matcher = LabelMatcher::new(label_texts).ok_or_else(|| {
        DetectError::invalid_rule(
            rule_id,
            "find by label",
            Some(anyhow::anyhow!("rule has no usable label texts")),
        )
    })?;

    let mut order: Vec<T::Node> = Vec::new();
    let mut best: HashMap<T::Node, ContainerMatch<T::Node>> = HashMap::new();

    for hit in find_label_hits(tree, &matcher, opts) {
        let container =
            match container_for_hit(tree, hit.node, container_selector, opts.max_ancestor_depth)? {
                Some(c) => c,
                None => {
                    trace!(rule = rule_id, label = ?hit.node, "label hit without container");
                    continue;
                }
            };

        let carrier = label_carrier(tree, &hit, &matcher);
        let confidence = container_label_confidence(tree, &hit, carrier, container);
        let candidate = ContainerMatch {
            node: container,
            rule_id: rule_id.to_string(),
            score: score * confidence,
            label_node: Some(carrier),
            label_confidence: Some(confidence),
        };

        match best.get(&container) {
            Some(existing) if existing.score >= candidate.score => {}
            Some(_) => {
                best.insert(container, candidate);
            }
            None => {
                order.push(container);
                best.insert(container, candidate);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|node| best.remove(&node))
        .collect())
}
