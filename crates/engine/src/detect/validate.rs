// ABOUTME: Validator library and scoring: weighted checks over extracted fields into a confidence.
// ABOUTME: Falls back to a completeness heuristic when a rule set configures no validators.

//! Phase 3 of detection.
//!
//! Each check awards between zero and its weight. Confidence is the awarded
//! total over the weight total; a candidate is valid when its confidence
//! reaches the rule set's `minConfidence`. Every check leaves a reason string
//! whether it passed or not.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use url::Url;

use crate::result::{FieldData, ValidationResult, ValidatorOutcome};
use crate::rules::{AdField, ValidationRule};

/// Completeness weights used when no validators are configured.
/// `images` stands in for "any media".
const HEURISTIC_WEIGHTS: [(AdField, f64); 6] = [
    (AdField::Advertiser, 0.3),
    (AdField::DestinationUrl, 0.3),
    (AdField::Label, 0.2),
    (AdField::Headline, 0.2),
    (AdField::Body, 0.1),
    (AdField::Images, 0.1),
];

/// Words that are disclosure labels rather than advertiser names.
const DISCLOSURE_WORDS: &[&str] = &["sponsored", "promoted", "ad", "advertisement", "paid"];

fn outcome(rule: &ValidationRule, awarded: f64, message: String) -> ValidatorOutcome {
    let weight = rule.weight();
    ValidatorOutcome {
        kind: rule.kind().to_string(),
        field: rule.field(),
        passed: weight > 0.0 && awarded >= weight,
        awarded,
        weight,
        message,
    }
}

/// Returns true for an absolute http(s) URL with a host.
pub fn is_valid_destination(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Why an advertiser name looks suspicious, if it does.
pub fn suspicious_advertiser(name: &str) -> Option<&'static str> {
    let name = name.trim();
    let len = name.chars().count();
    if len < 2 {
        Some("too short")
    } else if len > 100 {
        Some("too long")
    } else if name.chars().all(|c| c.is_ascii_digit()) {
        Some("digits only")
    } else if DISCLOSURE_WORDS.contains(&name.to_lowercase().as_str()) {
        Some("a disclosure label")
    } else {
        None
    }
}

/// Runs a single validator against the extracted fields.
pub fn run_validator(rule: &ValidationRule, fields: &FieldData) -> ValidatorOutcome {
    let weight = rule.weight();
    match rule {
        ValidationRule::RequiredField { field, .. } => {
            if fields.has(*field) {
                outcome(rule, weight, format!("{} is present", field))
            } else {
                outcome(rule, 0.0, format!("{} is missing", field))
            }
        }
        ValidationRule::LabelPattern { pattern, .. } => {
            let re = match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => re,
                Err(_) => return outcome(rule, 0.0, format!("label pattern {:?} is invalid", pattern)),
            };
            match fields.label.as_deref() {
                Some(label) if re.is_match(label) => {
                    outcome(rule, weight, format!("label {:?} matches {:?}", label, pattern))
                }
                Some(label) => outcome(
                    rule,
                    0.0,
                    format!("label {:?} does not match {:?}", label, pattern),
                ),
                None => outcome(rule, 0.0, "label is missing".to_string()),
            }
        }
        ValidationRule::UrlValid { .. } => match fields.destination_url.as_deref() {
            Some(url) if is_valid_destination(url) => {
                outcome(rule, weight, format!("destinationUrl {} is valid", url))
            }
            Some(url) => outcome(
                rule,
                0.0,
                format!("destinationUrl {:?} is not an absolute http(s) URL", url),
            ),
            None => outcome(rule, 0.0, "destinationUrl is missing".to_string()),
        },
        ValidationRule::MinTextLength {
            field, min_length, ..
        } => {
            let len = fields
                .get(*field)
                .map(|v| v.trim().chars().count())
                .unwrap_or(0);
            if len >= *min_length {
                outcome(
                    rule,
                    weight,
                    format!("{} has {} chars (min {})", field, len, min_length),
                )
            } else {
                let awarded = weight * len as f64 / *min_length as f64;
                outcome(
                    rule,
                    awarded,
                    format!("{} has {} chars, below min {}", field, len, min_length),
                )
            }
        }
        ValidationRule::AdvertiserName { .. } => match fields.advertiser.as_deref() {
            Some(name) if !name.trim().is_empty() => match suspicious_advertiser(name) {
                None => outcome(rule, weight, format!("advertiser {:?} looks valid", name)),
                Some(why) => outcome(
                    rule,
                    weight * 0.5,
                    format!("advertiser {:?} is suspicious: {}", name, why),
                ),
            },
            _ => outcome(rule, 0.0, "advertiser is missing".to_string()),
        },
    }
}

fn heuristic_checks(fields: &FieldData) -> Vec<ValidatorOutcome> {
    HEURISTIC_WEIGHTS
        .iter()
        .map(|&(field, weight)| {
            let (present, name) = if field == AdField::Images {
                (fields.has_media(), "media")
            } else {
                (fields.has(field), field.as_str())
            };
            ValidatorOutcome {
                kind: "completeness".to_string(),
                field,
                passed: present,
                awarded: if present { weight } else { 0.0 },
                weight,
                message: if present {
                    format!("{} is present", name)
                } else {
                    format!("{} is missing", name)
                },
            }
        })
        .collect()
}

/// Validates extracted fields and computes the candidate's confidence.
pub fn validate(
    fields: &FieldData,
    validators: &[ValidationRule],
    min_confidence: f64,
) -> ValidationResult {
    let checks: Vec<ValidatorOutcome> = if validators.is_empty() {
        heuristic_checks(fields)
    } else {
        validators.iter().map(|v| run_validator(v, fields)).collect()
    };

    let total_weight: f64 = checks.iter().map(|c| c.weight).sum();
    let awarded: f64 = checks.iter().map(|c| c.awarded).sum();
    let confidence = if total_weight > 0.0 {
        awarded / total_weight
    } else {
        0.0
    };

    let mut per_field: BTreeMap<AdField, (f64, f64)> = BTreeMap::new();
    for check in &checks {
        let entry = per_field.entry(check.field).or_insert((0.0, 0.0));
        entry.0 += check.awarded;
        entry.1 += check.weight;
    }
    let field_scores = per_field
        .into_iter()
        .map(|(field, (got, possible))| {
            let ratio = if possible > 0.0 { got / possible } else { 0.0 };
            (field, ratio)
        })
        .collect();

    ValidationResult {
        valid: confidence >= min_confidence,
        confidence,
        reasons: checks.iter().map(|c| c.message.clone()).collect(),
        field_scores,
        checks,
    }
}
