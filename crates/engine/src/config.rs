// ABOUTME: Static rule set checks run before a rule set is accepted: selectors, ranges, weights, coverage.
// ABOUTME: Errors block acceptance; warnings are advisory and logged by the detector.

//! Rule set validation.
//!
//! [`ConfigValidator::validate`] checks a typed [`RuleSet`];
//! [`ConfigValidator::validate_value`] starts one step earlier, from raw JSON,
//! so authoring tools can report missing top-level keys by name.

use regex::RegexBuilder;
use serde::Serialize;
use serde_json::Value;

use crate::dom::compiled::get_or_compile;
use crate::dom::text::normalize_whitespace;
use crate::rules::{AdField, ContainerRuleKind, RuleSet, ValidationRule};

/// Top-level keys a rule set document must carry.
pub const REQUIRED_KEYS: [&str; 5] = ["id", "version", "containerRules", "fieldRules", "minConfidence"];

/// How far validator weights may stray from 1.0 before a warning.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.01;

/// Outcome of validating one rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Validates rule sets.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    weight_tolerance: f64,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
        }
    }

    /// Overrides the weight-sum tolerance.
    pub fn with_weight_tolerance(mut self, tolerance: f64) -> Self {
        self.weight_tolerance = tolerance;
        self
    }

    /// Validates a raw JSON rule set document.
    pub fn validate_value(&self, value: &Value) -> ConfigReport {
        let mut report = ConfigReport::default();
        let object = match value.as_object() {
            Some(o) => o,
            None => {
                report.errors.push("rule set must be a JSON object".to_string());
                return report.finish();
            }
        };

        for key in REQUIRED_KEYS {
            if !object.contains_key(key) {
                report.errors.push(format!("missing required field `{}`", key));
            }
        }
        if !report.errors.is_empty() {
            return report.finish();
        }

        match serde_json::from_value::<RuleSet>(value.clone()) {
            Ok(rule_set) => self.validate(&rule_set),
            Err(e) => {
                report.errors.push(format!("rule set does not deserialize: {}", e));
                report.finish()
            }
        }
    }

    /// Validates a typed rule set.
    pub fn validate(&self, rule_set: &RuleSet) -> ConfigReport {
        let mut report = ConfigReport::default();
        let errors = &mut report.errors;
        let warnings = &mut report.warnings;

        if rule_set.id.trim().is_empty() {
            errors.push("`id` must not be empty".to_string());
        }
        if rule_set.version.trim().is_empty() {
            errors.push("`version` must not be empty".to_string());
        }
        if !in_unit_range(rule_set.min_confidence) {
            errors.push(format!(
                "`minConfidence` {} is outside [0, 1]",
                rule_set.min_confidence
            ));
        }
        if let Some(threshold) = rule_set.container_score_threshold {
            if !in_unit_range(threshold) {
                errors.push(format!(
                    "`containerScoreThreshold` {} is outside [0, 1]",
                    threshold
                ));
            }
            if rule_set.adaptive_threshold {
                warnings.push(
                    "both `containerScoreThreshold` and `adaptiveThreshold` are set; the fixed threshold wins"
                        .to_string(),
                );
            }
        }

        if rule_set.container_rules.is_empty() {
            errors.push("no container rules".to_string());
        }
        for (index, rule) in rule_set.container_rules.iter().enumerate() {
            let at = format!("container rule `{}`", rule.rule_id(index));
            if !in_unit_range(rule.score) {
                errors.push(format!("{}: score {} is outside [0, 1]", at, rule.score));
            }
            match &rule.kind {
                ContainerRuleKind::LabelLed { label_texts, .. } => {
                    if label_texts
                        .iter()
                        .all(|l| normalize_whitespace(l).is_empty())
                    {
                        errors.push(format!("{}: no label texts", at));
                    }
                }
                ContainerRuleKind::Attribute { key, .. } => {
                    if key.trim().is_empty() {
                        errors.push(format!("{}: empty attribute key", at));
                    }
                }
                ContainerRuleKind::Css { .. } => {}
            }
            for selector in rule.selectors() {
                if let Err(e) = get_or_compile(selector) {
                    errors.push(format!("{}: {}", at, e));
                }
            }
        }

        for (index, rule) in rule_set.field_rules.iter().enumerate() {
            let at = format!("field rule `{}`", rule.rule_id(index));
            if !in_unit_range(rule.score) {
                errors.push(format!("{}: score {} is outside [0, 1]", at, rule.score));
            }
            if let Err(e) = get_or_compile(&rule.selector) {
                errors.push(format!("{}: {}", at, e));
            }
            if matches!(&rule.attr, Some(a) if a.trim().is_empty()) {
                errors.push(format!("{}: empty attribute name", at));
            }
        }
        for field in AdField::CRITICAL {
            if !rule_set.has_extractor_for(field) {
                warnings.push(format!("no extractor for critical field `{}`", field));
            }
        }

        self.check_validators(&rule_set.validators, errors, warnings);
        report.finish()
    }

    fn check_validators(
        &self,
        validators: &[ValidationRule],
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        for (index, validator) in validators.iter().enumerate() {
            let at = format!("validator {} ({})", index, validator.kind());
            let weight = validator.weight();
            if !in_unit_range(weight) {
                errors.push(format!("{}: weight {} is outside [0, 1]", at, weight));
            }
            match validator {
                ValidationRule::LabelPattern { pattern, .. } => {
                    if let Err(e) = RegexBuilder::new(pattern).case_insensitive(true).build() {
                        errors.push(format!("{}: invalid pattern: {}", at, e));
                    }
                }
                ValidationRule::MinTextLength { min_length: 0, .. } => {
                    warnings.push(format!("{}: `minLength` is 0 and always passes", at));
                }
                _ => {}
            }
        }

        if validators.is_empty() {
            return;
        }
        let total: f64 = validators.iter().map(ValidationRule::weight).sum();
        if total <= 0.0 {
            errors.push("validator weights are all zero".to_string());
        } else if (total - 1.0).abs() > self.weight_tolerance {
            warnings.push(format!("validator weights sum to {:.3}, expected 1.0", total));
        }
    }
}
