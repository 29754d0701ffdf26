// ABOUTME: Container detector: runs css, attribute and label-led rules, applies negative filters, dedups and thresholds.
// ABOUTME: A failing rule is logged and contributes nothing; it never aborts the pass.

//! Phase 1 of detection: proposing scored container nodes.
//!
//! Per rule, raw matches are produced and filtered through the rule's own
//! negative filters. Surviving matches from all rules are deduplicated by
//! node identity (highest score wins, earlier rule wins ties) and cut at the
//! pass threshold: the rule set's fixed `containerScoreThreshold`, else an
//! adaptive threshold computed from the score distribution, else the
//! configured default.

use std::collections::HashMap;
use std::fmt;

use aho_corasick::AhoCorasick;
use tracing::{debug, trace, warn};

use crate::detect::label::find_by_label;
use crate::dom::distance::document_positions;
use crate::dom::tree::DocumentTree;
use crate::error::DetectError;
use crate::options::DetectorOptions;
use crate::result::ContainerMatch;
use crate::rules::{ContainerRule, ContainerRuleKind, NegativeFilters, RuleSet};

/// Share of the top score an adaptive threshold starts from.
const ADAPTIVE_MAX_FACTOR: f64 = 0.8;
/// Upper bound of the adaptive threshold.
const ADAPTIVE_CEILING: f64 = 0.95;
/// The average counts as "far below" the 80%-of-max bar under this share of it.
const ADAPTIVE_FALLBACK_RATIO: f64 = 0.5;
/// Multiplier applied to the average in the fallback branch.
const ADAPTIVE_FALLBACK_FACTOR: f64 = 1.1;

/// Why a node was dropped by a rule's negative filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// The node or a descendant matched an `excludeSelectors` entry.
    Selector(String),
    /// The node's text contained an `excludeIfContains` entry.
    Contains(String),
    /// An ancestor matched an `excludeAncestors` entry.
    Ancestor(String),
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Selector(s) => write!(f, "matches exclude selector `{}`", s),
            Exclusion::Contains(s) => write!(f, "text contains `{}`", s),
            Exclusion::Ancestor(s) => write!(f, "has ancestor matching `{}`", s),
        }
    }
}

/// Where the pass threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    Fixed,
    Adaptive,
    /// The `avgScore * 1.1` branch of the adaptive threshold.
    AdaptiveFallback,
    Default,
}

/// The score a container match needs to survive phase 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub value: f64,
    pub source: ThresholdSource,
}

/// Evaluates a rule's negative filters against one node.
pub fn check_exclusions<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    filters: &NegativeFilters,
) -> Result<Option<Exclusion>, DetectError> {
    for selector in &filters.exclude_selectors {
        if tree.matches(node, selector)? || !tree.select(node, selector)?.is_empty() {
            return Ok(Some(Exclusion::Selector(selector.clone())));
        }
    }

    let needles: Vec<&str> = filters
        .exclude_if_contains
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    if !needles.is_empty() {
        let searcher = AhoCorasick::new(&needles).map_err(|e| {
            DetectError::invalid_rule("excludeIfContains", "build matcher", Some(e.into()))
        })?;
        if let Some(found) = searcher.find(&tree.text(node)) {
            let needle = needles[found.pattern().as_usize()];
            return Ok(Some(Exclusion::Contains(needle.to_string())));
        }
    }

    if !filters.exclude_ancestors.is_empty() {
        let ancestors = tree.ancestors(node);
        for selector in &filters.exclude_ancestors {
            for ancestor in &ancestors {
                if tree.matches(*ancestor, selector)? {
                    return Ok(Some(Exclusion::Ancestor(selector.clone())));
                }
            }
        }
    }

    Ok(None)
}

/// Raw matches of one rule, before negative filters.
pub fn raw_matches<T: DocumentTree>(
    tree: &T,
    rule: &ContainerRule,
    rule_id: &str,
    opts: &DetectorOptions,
) -> Result<Vec<ContainerMatch<T::Node>>, DetectError> {
    let root = tree.root();
    match &rule.kind {
        ContainerRuleKind::Css { selector } => Ok(tree
            .select(root, selector)?
            .into_iter()
            .map(|node| ContainerMatch::new(node, rule_id, rule.score))
            .collect()),
        ContainerRuleKind::Attribute { key, value } => Ok(tree
            .descendants(root)
            .into_iter()
            .filter(|node| match (tree.attr(*node, key), value) {
                (Some(actual), Some(expected)) => actual == *expected,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .map(|node| ContainerMatch::new(node, rule_id, rule.score))
            .collect()),
        ContainerRuleKind::LabelLed {
            label_texts,
            container_selector,
        } => find_by_label(
            tree,
            rule_id,
            label_texts,
            container_selector.as_deref(),
            rule.score,
            opts,
        ),
    }
}

/// Matches of one rule that survive its own negative filters.
///
/// Any invalid selector, positive or negative, fails the whole rule.
pub fn run_container_rule<T: DocumentTree>(
    tree: &T,
    rule: &ContainerRule,
    rule_id: &str,
    opts: &DetectorOptions,
) -> Result<Vec<ContainerMatch<T::Node>>, DetectError> {
    let raw = raw_matches(tree, rule, rule_id, opts)?;
    if rule.filters.is_empty() {
        return Ok(raw);
    }

    let mut kept = Vec::with_capacity(raw.len());
    for candidate in raw {
        match check_exclusions(tree, candidate.node, &rule.filters)? {
            Some(reason) => {
                trace!(rule = rule_id, node = ?candidate.node, %reason, "container excluded");
            }
            None => kept.push(candidate),
        }
    }
    Ok(kept)
}

/// Adaptive threshold over a pass's deduplicated scores.
///
/// `clamp(max(maxScore * 0.8, minConfidence), minConfidence, 0.95)`, replaced
/// by the unclamped `avgScore * 1.1` when the average is far below the 80% bar.
/// Returns `None` for an empty score list.
pub fn adaptive_threshold(scores: &[f64], min_confidence: f64) -> Option<Threshold> {
    if scores.is_empty() {
        return None;
    }
    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;

    let bar = max * ADAPTIVE_MAX_FACTOR;
    if avg < bar * ADAPTIVE_FALLBACK_RATIO {
        // TODO: this branch can undercut min_confidence; decide whether to floor it
        return Some(Threshold {
            value: avg * ADAPTIVE_FALLBACK_FACTOR,
            source: ThresholdSource::AdaptiveFallback,
        });
    }

    // min_confidence wins over the ceiling when it is higher
    let value = bar.max(min_confidence).min(ADAPTIVE_CEILING).max(min_confidence);
    Some(Threshold {
        value,
        source: ThresholdSource::Adaptive,
    })
}

/// Resolves the pass threshold for the given deduplicated scores.
pub fn resolve_threshold(rule_set: &RuleSet, scores: &[f64], opts: &DetectorOptions) -> Threshold {
    if let Some(fixed) = rule_set.container_score_threshold {
        return Threshold {
            value: fixed,
            source: ThresholdSource::Fixed,
        };
    }
    if rule_set.adaptive_threshold {
        if let Some(t) = adaptive_threshold(scores, rule_set.min_confidence) {
            return t;
        }
    }
    Threshold {
        value: opts.default_threshold,
        source: ThresholdSource::Default,
    }
}

/// Output of phase 1: surviving matches and the threshold they cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPass<N> {
    pub matches: Vec<ContainerMatch<N>>,
    pub threshold: Threshold,
}

/// Runs every container rule and returns the thresholded, deduplicated
/// matches in document order.
pub fn find_containers<T: DocumentTree>(
    rule_set: &RuleSet,
    tree: &T,
    opts: &DetectorOptions,
) -> Vec<ContainerMatch<T::Node>> {
    container_pass(rule_set, tree, opts).matches
}

/// Like [`find_containers`], also reporting the threshold that was applied.
pub fn container_pass<T: DocumentTree>(
    rule_set: &RuleSet,
    tree: &T,
    opts: &DetectorOptions,
) -> ContainerPass<T::Node> {
    let mut best: HashMap<T::Node, ContainerMatch<T::Node>> = HashMap::new();

    for (index, rule) in rule_set.container_rules.iter().enumerate() {
        let rule_id = rule.rule_id(index);
        let matches = match run_container_rule(tree, rule, &rule_id, opts) {
            Ok(m) => m,
            Err(err) => {
                warn!(rule = %rule_id, error = %err, "container rule failed, skipping");
                continue;
            }
        };
        trace!(rule = %rule_id, count = matches.len(), "container rule matched");

        for candidate in matches {
            match best.get(&candidate.node) {
                Some(existing) if existing.score >= candidate.score => {}
                _ => {
                    best.insert(candidate.node, candidate);
                }
            }
        }
    }

    let scores: Vec<f64> = best.values().map(|m| m.score).collect();
    let threshold = resolve_threshold(rule_set, &scores, opts);
    debug!(
        rule_set = %rule_set.id,
        candidates = best.len(),
        threshold = threshold.value,
        source = ?threshold.source,
        "container threshold resolved"
    );

    let positions = document_positions(tree);
    let mut kept: Vec<ContainerMatch<T::Node>> = best
        .into_values()
        .filter(|m| m.score >= threshold.value)
        .collect();
    kept.sort_by_key(|m| positions.get(&m.node).copied().unwrap_or(usize::MAX));
    ContainerPass {
        matches: kept,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html::HtmlTree;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"
        <html><body><main id="feed">
            <article id="a1" class="post" data-ad="true">Promoted <a class="author">Acme</a></article>
            <article id="a2" class="post">Organic <a class="author">Bob</a></article>
            <article id="a3" class="post promo" data-ad="false">Suggested for you</article>
            <aside><article id="a4" class="post" data-ad="true">Sidebar</article></aside>
        </main></body></html>
    "#;

    fn node(tree: &HtmlTree, css: &str) -> ego_tree::NodeId {
        tree.query(css).unwrap()[0]
    }

    fn rules(container_rules: Vec<ContainerRule>) -> RuleSet {
        let mut rs = RuleSet::new("test", 0.5);
        rs.container_rules = container_rules;
        rs
    }

    #[test]
    fn test_css_rule_matches_in_document_order() {
        let tree = HtmlTree::parse_document(FEED);
        let rs = rules(vec![ContainerRule::css("article.post", 0.9)]);
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        let ids: Vec<_> = found.iter().map(|m| tree.attr(m.node, "id").unwrap()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3", "a4"]);
        assert_eq!(found[0].rule_id, "container-0-css");
    }

    #[test]
    fn test_attribute_rule_with_and_without_value() {
        let tree = HtmlTree::parse_document(FEED);
        let opts = DetectorOptions::default();
        let rs = rules(vec![ContainerRule::attribute("data-ad", Some("true"), 0.8)]);
        let found = find_containers(&rs, &tree, &opts);
        assert_eq!(found.len(), 2);

        let rs = rules(vec![ContainerRule::attribute("data-ad", None, 0.8)]);
        assert_eq!(find_containers(&rs, &tree, &opts).len(), 3);
    }

    #[test]
    fn test_dedup_keeps_highest_score_and_first_rule_on_ties() {
        let tree = HtmlTree::parse_document(FEED);
        let rs = rules(vec![
            ContainerRule::css("#a1", 0.7).with_id("low"),
            ContainerRule::css("article.post", 0.9).with_id("broad"),
            ContainerRule::css("#a1", 0.9).with_id("tie"),
        ]);
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        let a1 = found.iter().find(|m| m.node == node(&tree, "#a1")).unwrap();
        assert_eq!(a1.rule_id, "broad");
        assert_eq!(a1.score, 0.9);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_negative_filters() {
        let tree = HtmlTree::parse_document(FEED);
        let filters = NegativeFilters {
            exclude_selectors: vec![".promo".to_string(), "a.author[href]".to_string()],
            exclude_if_contains: vec!["Organic".to_string()],
            exclude_ancestors: vec!["aside".to_string()],
        };
        let rs = rules(vec![ContainerRule::css("article.post", 0.9).with_filters(filters)]);
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, node(&tree, "#a1"));
    }

    #[test]
    fn test_exclude_selector_matches_descendants() {
        let tree = HtmlTree::parse_document(FEED);
        let filters = NegativeFilters {
            exclude_selectors: vec!["a.author".to_string()],
            ..Default::default()
        };
        let a1 = node(&tree, "#a1");
        let reason = check_exclusions(&tree, a1, &filters).unwrap();
        assert_eq!(reason, Some(Exclusion::Selector("a.author".to_string())));
        let a3 = node(&tree, "#a3");
        assert_eq!(check_exclusions(&tree, a3, &filters).unwrap(), None);
    }

    #[test]
    fn test_invalid_rule_is_skipped_not_fatal() {
        let tree = HtmlTree::parse_document(FEED);
        let broken = ContainerRule::css("article[[", 1.0);
        let bad_filter = ContainerRule::css("#a2", 1.0).with_filters(NegativeFilters {
            exclude_ancestors: vec!["main((".to_string()],
            ..Default::default()
        });
        let rs = rules(vec![broken, bad_filter, ContainerRule::css("#a1", 0.9)]);
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, node(&tree, "#a1"));
    }

    #[test]
    fn test_default_threshold_drops_low_scores() {
        let tree = HtmlTree::parse_document(FEED);
        let rs = rules(vec![
            ContainerRule::css("#a1", 0.61),
            ContainerRule::css("#a2", 0.59),
        ]);
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node, node(&tree, "#a1"));
    }

    #[test]
    fn test_fixed_threshold_wins_over_adaptive() {
        let mut rs = rules(vec![]);
        rs.container_score_threshold = Some(0.3);
        rs.adaptive_threshold = true;
        let t = resolve_threshold(&rs, &[0.9, 0.4], &DetectorOptions::default());
        assert_eq!(t.value, 0.3);
        assert_eq!(t.source, ThresholdSource::Fixed);
    }

    #[test]
    fn test_adaptive_threshold_primary_branch() {
        // max 0.9 -> bar 0.72; avg 0.8 is not far below
        let t = adaptive_threshold(&[0.9, 0.7], 0.5).unwrap();
        assert_eq!(t.source, ThresholdSource::Adaptive);
        assert!((t.value - 0.72).abs() < 1e-9);

        // floor at min_confidence
        let t = adaptive_threshold(&[0.5, 0.45], 0.6).unwrap();
        assert!((t.value - 0.6).abs() < 1e-9);

        // ceiling at 0.95
        let t = adaptive_threshold(&[1.0, 1.0, 1.0], 0.5).unwrap();
        assert!((t.value - 0.8).abs() < 1e-9);
        let t = adaptive_threshold(&[1.0], 0.97).unwrap();
        assert!((t.value - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_adaptive_threshold_fallback_branch() {
        // max 1.0 -> bar 0.8; avg 0.325 < 0.4 -> avg * 1.1
        let t = adaptive_threshold(&[1.0, 0.1, 0.1, 0.1], 0.5).unwrap();
        assert_eq!(t.source, ThresholdSource::AdaptiveFallback);
        assert!((t.value - 0.3575).abs() < 1e-9);
        assert!(adaptive_threshold(&[], 0.5).is_none());
    }

    #[test]
    fn test_adaptive_threshold_in_pass() {
        let tree = HtmlTree::parse_document(FEED);
        let mut rs = rules(vec![
            ContainerRule::css("#a1", 1.0),
            ContainerRule::css("#a2", 0.85),
            ContainerRule::css("#a3", 0.7),
        ]);
        rs.adaptive_threshold = true;
        // avg 0.85, bar 0.8
        let found = find_containers(&rs, &tree, &DetectorOptions::default());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let tree = HtmlTree::parse_document(FEED);
        let rs = rules(vec![
            ContainerRule::label_led(["Promoted"], 1.0),
            ContainerRule::css("article.post", 0.7),
        ]);
        let opts = DetectorOptions::default();
        let first = find_containers(&rs, &tree, &opts);
        let second = find_containers(&rs, &tree, &opts);
        assert_eq!(first, second);
    }
}
