// ABOUTME: Per-node detection introspection: every rule's verdict, every field attempt, every validator.
// ABOUTME: Read-only and reproducible for any node, whether or not a pass would accept it.

use serde::Serialize;

use crate::detect::container::{check_exclusions, container_pass, raw_matches, ThresholdSource};
use crate::detect::fields::extract_fields;
use crate::detect::validate::validate;
use crate::dom::tree::DocumentTree;
use crate::options::DetectorOptions;
use crate::result::{FieldData, FieldExtraction, ValidationResult};
use crate::rules::{AdField, RuleSet};

/// What one container rule made of the inspected node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RuleStatus {
    Matched {
        score: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label_confidence: Option<f64>,
    },
    /// Matched, then dropped by one of the rule's negative filters.
    Excluded { score: f64, reason: String },
    NoMatch,
    /// The rule failed as a whole (invalid selector, unusable labels).
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRuleDebug {
    pub rule_id: String,
    pub rule_type: String,
    #[serde(flatten)]
    pub status: RuleStatus,
}

/// Every rule attempt for one field and the value that ended up stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDebug {
    pub field: AdField,
    pub attempts: Vec<FieldExtraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDebugInfo {
    /// `tag#id.class` of the inspected node.
    pub node: String,
    pub path: String,
    pub container_rules: Vec<ContainerRuleDebug>,
    /// Best surviving score across rules, before the threshold.
    pub best_score: Option<f64>,
    pub winning_rule: Option<String>,
    pub threshold: f64,
    pub threshold_source: String,
    /// Whether the node survived phase 1 of a full pass.
    pub passes_container_phase: bool,
    pub fields: FieldData,
    pub field_attempts: Vec<FieldDebug>,
    pub validation: ValidationResult,
    pub would_accept: bool,
}

fn threshold_source_name(source: ThresholdSource) -> &'static str {
    match source {
        ThresholdSource::Fixed => "fixed",
        ThresholdSource::Adaptive => "adaptive",
        ThresholdSource::AdaptiveFallback => "adaptive-fallback",
        ThresholdSource::Default => "default",
    }
}

/// Explains how a detection pass treats `node`.
///
/// Fields and validation are computed for the node regardless of whether any
/// container rule matched it, using the label node of the best matching
/// label-led rule as extraction context.
pub fn generate_debug_info<T: DocumentTree>(
    tree: &T,
    node: T::Node,
    rule_set: &RuleSet,
    opts: &DetectorOptions,
) -> DetectionDebugInfo {
    let mut container_rules = Vec::with_capacity(rule_set.container_rules.len());
    let mut best: Option<(f64, String, Option<T::Node>)> = None;

    for (index, rule) in rule_set.container_rules.iter().enumerate() {
        let rule_id = rule.rule_id(index);
        let status = match raw_matches(tree, rule, &rule_id, opts) {
            Err(err) => RuleStatus::Error {
                message: err.to_string(),
            },
            Ok(matches) => match matches.into_iter().find(|m| m.node == node) {
                None => RuleStatus::NoMatch,
                Some(m) => match check_exclusions(tree, node, &rule.filters) {
                    Err(err) => RuleStatus::Error {
                        message: err.to_string(),
                    },
                    Ok(Some(reason)) => RuleStatus::Excluded {
                        score: m.score,
                        reason: reason.to_string(),
                    },
                    Ok(None) => {
                        if best.as_ref().map(|(s, _, _)| m.score > *s).unwrap_or(true) {
                            best = Some((m.score, rule_id.clone(), m.label_node));
                        }
                        RuleStatus::Matched {
                            score: m.score,
                            label: m.label_node.map(|l| tree.describe(l)),
                            label_confidence: m.label_confidence,
                        }
                    }
                },
            },
        };
        container_rules.push(ContainerRuleDebug {
            rule_id,
            rule_type: rule.kind.type_name().to_string(),
            status,
        });
    }

    let pass = container_pass(rule_set, tree, opts);
    let passes_container_phase = pass.matches.iter().any(|m| m.node == node);

    let label_node = best.as_ref().and_then(|(_, _, label)| *label);
    let (fields, attempts) = extract_fields(tree, node, &rule_set.field_rules, label_node);
    let validation = validate(&fields, &rule_set.validators, rule_set.min_confidence);

    let field_attempts = AdField::ALL
        .iter()
        .filter(|field| rule_set.has_extractor_for(**field))
        .map(|field| FieldDebug {
            field: *field,
            attempts: attempts.iter().filter(|a| a.field == *field).cloned().collect(),
            value: fields.get(*field).map(str::to_string),
        })
        .collect();

    DetectionDebugInfo {
        node: tree.describe(node),
        path: tree.tag_path(node),
        container_rules,
        best_score: best.as_ref().map(|(s, _, _)| *s),
        winning_rule: best.map(|(_, id, _)| id),
        threshold: pass.threshold.value,
        threshold_source: threshold_source_name(pass.threshold.source).to_string(),
        passes_container_phase,
        would_accept: passes_container_phase && validation.valid,
        fields,
        field_attempts,
        validation,
    }
}
