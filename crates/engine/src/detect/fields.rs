// ABOUTME: Field extractor: per-field fallback chains of selector rules, tried highest score first.
// ABOUTME: Advertiser fields near a known label node are disambiguated by DOM distance to the label.

//! Phase 2 of detection: pulling field values out of a container.
//!
//! Key behaviors:
//! - Rules for the same field are tried in descending score order; the first
//!   rule yielding a non-empty value wins and later rules are not attempted.
//! - Text extraction normalizes whitespace; attribute extraction trims.
//! - Media fields (`images`, `videos`) keep every value of the winning rule.
//! - `advertiser` / `advertiserHandle` with a label node in context pick the
//!   match closest to the label instead of the first match.
//! - An invalid selector is recorded on the attempt and treated as a miss.

use std::cmp::Ordering;

use tracing::{trace, warn};

use crate::detect::transform;
use crate::dom::distance::lca_distance;
use crate::dom::tree::DocumentTree;
use crate::result::{FieldData, FieldExtraction};
use crate::rules::{AdField, FieldRule};

/// A field rule together with its stable id.
#[derive(Debug, Clone, Copy)]
struct RankedRule<'a> {
    id_index: usize,
    rule: &'a FieldRule,
}

/// Field rules targeting `field`, highest score first, declaration order on ties.
fn fallback_chain(field_rules: &[FieldRule], field: AdField) -> Vec<RankedRule<'_>> {
    let mut chain: Vec<RankedRule<'_>> = field_rules
        .iter()
        .enumerate()
        .filter(|(_, r)| r.field == field)
        .map(|(id_index, rule)| RankedRule { id_index, rule })
        .collect();
    chain.sort_by(|a, b| {
        b.rule
            .score
            .partial_cmp(&a.rule.score)
            .unwrap_or(Ordering::Equal)
    });
    chain
}

/// Reads one node's value for a rule: attribute or text, then the transform.
fn read_value<T: DocumentTree>(tree: &T, node: T::Node, rule: &FieldRule) -> Option<String> {
    let raw = match &rule.attr {
        Some(attr) => tree.attr(node, attr)?.trim().to_string(),
        None => tree.text(node),
    };
    let value = transform::apply(rule.transform, &raw);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Index of the value whose node is nearest to `label`; the first one wins ties.
fn nearest_to_label<T: DocumentTree>(
    tree: &T,
    candidates: &[(T::Node, String)],
    label: T::Node,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, (node, _)) in candidates.iter().enumerate() {
        let distance = match lca_distance(tree, *node, label) {
            Some(d) => d,
            None => continue,
        };
        match best {
            Some((_, best_distance)) if best_distance <= distance => {}
            _ => best = Some((i, distance)),
        }
    }
    best.map(|(i, _)| i)
}

/// Attempts one rule against a container.
///
/// Returns the values to store (empty on a miss) and the attempt record.
pub fn attempt_rule<T: DocumentTree>(
    tree: &T,
    container: T::Node,
    rule: &FieldRule,
    rule_id: &str,
    label_node: Option<T::Node>,
) -> (Vec<String>, FieldExtraction) {
    let mut record = FieldExtraction {
        field: rule.field,
        rule_id: rule_id.to_string(),
        selector: rule.selector.clone(),
        score: rule.score,
        value: None,
        matched_nodes: 0,
        used_context: false,
        error: None,
    };

    let nodes = match tree.select(container, &rule.selector) {
        Ok(nodes) => nodes,
        Err(err) => {
            warn!(rule = rule_id, error = %err, "field rule failed");
            record.error = Some(err.to_string());
            return (Vec::new(), record);
        }
    };
    record.matched_nodes = nodes.len();

    let candidates: Vec<(T::Node, String)> = nodes
        .into_iter()
        .filter_map(|node| read_value(tree, node, rule).map(|v| (node, v)))
        .collect();
    if candidates.is_empty() {
        return (Vec::new(), record);
    }

    let values = match label_node {
        Some(label) if rule.field.uses_label_context() => {
            match nearest_to_label(tree, &candidates, label) {
                Some(i) => {
                    record.used_context = true;
                    trace!(rule = rule_id, picked = i, of = candidates.len(), "label context");
                    vec![candidates[i].1.clone()]
                }
                None => vec![candidates[0].1.clone()],
            }
        }
        _ if rule.field.is_media() => candidates.into_iter().map(|(_, v)| v).collect(),
        _ => vec![candidates[0].1.clone()],
    };

    record.value = values.first().cloned();
    (values, record)
}

/// Extracts every field from a container.
///
/// Returns the extracted values and one record per attempted rule, in the
/// order they were tried.
pub fn extract_fields<T: DocumentTree>(
    tree: &T,
    container: T::Node,
    field_rules: &[FieldRule],
    label_node: Option<T::Node>,
) -> (FieldData, Vec<FieldExtraction>) {
    let mut data = FieldData::default();
    let mut attempts = Vec::new();

    for field in AdField::ALL {
        for ranked in fallback_chain(field_rules, field) {
            let rule_id = ranked.rule.rule_id(ranked.id_index);
            let (values, record) = attempt_rule(tree, container, ranked.rule, &rule_id, label_node);
            attempts.push(record);
            if !values.is_empty() {
                data.set(field, values);
                break;
            }
        }
    }

    (data, attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html::HtmlTree;
    use crate::rules::Transform;
    use pretty_assertions::assert_eq;

    const AD_HTML: &str = r#"
        <article id="ad">
            <div class="header">
                <span id="label">Sponsored</span>
                <a class="user" href="/near">@nearbrand</a>
            </div>
            <div class="body">
                <div><div><blockquote><a class="user" href="/far">@quoted</a></blockquote></div></div>
                <h3>  Big   Sale  </h3>
                <p class="empty"></p>
                <a class="cta" href="https://shop.test/?utm_source=feed&id=9">Shop now</a>
                <img src="/a.png"><img src=""><img src="/b.png">
            </div>
        </article>
    "#;

    fn node(tree: &HtmlTree, css: &str) -> ego_tree::NodeId {
        tree.query(css).unwrap()[0]
    }

    #[test]
    fn test_fallback_uses_next_rule_when_best_misses() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let rules = vec![
            FieldRule::new(AdField::Headline, "h2.title", 1.0),
            FieldRule::new(AdField::Headline, "p.empty", 0.6),
            FieldRule::new(AdField::Headline, "h3", 0.8),
        ];
        let (data, attempts) = extract_fields(&tree, ad, &rules, None);
        assert_eq!(data.headline.as_deref(), Some("Big Sale"));
        let tried: Vec<&str> = attempts.iter().map(|a| a.rule_id.as_str()).collect();
        assert_eq!(tried, vec!["field-headline-0", "field-headline-2"]);
        assert!(!attempts[0].succeeded());
        assert!(attempts[1].succeeded());
    }

    #[test]
    fn test_attribute_and_url_clean() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let rules = vec![FieldRule::new(AdField::DestinationUrl, "a.cta", 1.0)
            .with_attr("href")
            .with_transform(Transform::UrlClean)];
        let (data, _) = extract_fields(&tree, ad, &rules, None);
        assert_eq!(data.destination_url.as_deref(), Some("https://shop.test/?id=9"));
    }

    #[test]
    fn test_media_collects_all_non_empty_values() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let rules = vec![FieldRule::new(AdField::Images, "img", 1.0).with_attr("src")];
        let (data, attempts) = extract_fields(&tree, ad, &rules, None);
        assert_eq!(data.images, vec!["/a.png", "/b.png"]);
        assert_eq!(attempts[0].matched_nodes, 3);
    }

    #[test]
    fn test_label_context_picks_nearest_advertiser() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let label = node(&tree, "#label");
        let rules = vec![FieldRule::new(AdField::AdvertiserHandle, "a.user", 1.0)];

        // Document order alone would also pick @nearbrand; reverse the
        // preference by asking from the quoted block's point of view.
        let (data, attempts) = extract_fields(&tree, ad, &rules, Some(label));
        assert_eq!(data.advertiser_handle.as_deref(), Some("@nearbrand"));
        assert!(attempts[0].used_context);

        let quote = node(&tree, "blockquote");
        let (data, _) = extract_fields(&tree, ad, &rules, Some(quote));
        assert_eq!(data.advertiser_handle.as_deref(), Some("@quoted"));
    }

    #[test]
    fn test_label_context_ignored_for_other_fields() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let quote = node(&tree, "blockquote");
        let rules = vec![FieldRule::new(AdField::Body, "a.user", 1.0)];
        let (data, attempts) = extract_fields(&tree, ad, &rules, Some(quote));
        assert_eq!(data.body.as_deref(), Some("@nearbrand"));
        assert!(!attempts[0].used_context);
    }

    #[test]
    fn test_invalid_selector_is_recorded_and_falls_back() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let rules = vec![
            FieldRule::new(AdField::Cta, "a[[", 1.0),
            FieldRule::new(AdField::Cta, "a.cta", 0.5),
        ];
        let (data, attempts) = extract_fields(&tree, ad, &rules, None);
        assert_eq!(data.cta.as_deref(), Some("Shop now"));
        assert!(attempts[0].error.is_some());
        assert_eq!(attempts[1].value.as_deref(), Some("Shop now"));
    }

    #[test]
    fn test_missing_fields_are_absent_not_errors() {
        let tree = HtmlTree::parse_document(AD_HTML);
        let ad = node(&tree, "#ad");
        let rules = vec![FieldRule::new(AdField::Videos, "video", 1.0).with_attr("src")];
        let (data, attempts) = extract_fields(&tree, ad, &rules, None);
        assert!(data.videos.is_empty());
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].error.is_none());
    }
}
