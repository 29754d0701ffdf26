// ABOUTME: Rule set data model: container rules, field rules and validators as serde tagged unions.
// ABOUTME: Defines the JSON wire contract between rule authoring and the engine, plus stable rule ids.

//! Declarative, per-site detection rules.
//!
//! A [`RuleSet`] is loaded once per site and treated as read-only for the
//! life of a detection session. Rule variants are modelled as enums so that
//! invalid field combinations (a label-led rule without labels, a CSS rule
//! with an attribute key) cannot be expressed.

pub mod loader;

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single named datum extracted from an ad container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdField {
    Label,
    Advertiser,
    AdvertiserHandle,
    Headline,
    Body,
    Cta,
    DestinationUrl,
    Images,
    Videos,
}

impl AdField {
    /// Every field, in extraction order.
    pub const ALL: [AdField; 9] = [
        AdField::Label,
        AdField::Advertiser,
        AdField::AdvertiserHandle,
        AdField::Headline,
        AdField::Body,
        AdField::Cta,
        AdField::DestinationUrl,
        AdField::Images,
        AdField::Videos,
    ];

    /// Fields every rule set is expected to have an extractor for.
    pub const CRITICAL: [AdField; 2] = [AdField::Advertiser, AdField::DestinationUrl];

    /// The camelCase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdField::Label => "label",
            AdField::Advertiser => "advertiser",
            AdField::AdvertiserHandle => "advertiserHandle",
            AdField::Headline => "headline",
            AdField::Body => "body",
            AdField::Cta => "cta",
            AdField::DestinationUrl => "destinationUrl",
            AdField::Images => "images",
            AdField::Videos => "videos",
        }
    }

    /// Media fields collect every match instead of the first.
    pub fn is_media(&self) -> bool {
        matches!(self, AdField::Images | AdField::Videos)
    }

    /// Fields where several candidates are disambiguated by distance to the label.
    pub fn uses_label_context(&self) -> bool {
        matches!(self, AdField::Advertiser | AdField::AdvertiserHandle)
    }
}

impl fmt::Display for AdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clauses that exclude an otherwise-matching container node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegativeFilters {
    /// Drop the node if it or any descendant matches one of these selectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_selectors: Vec<String>,
    /// Drop the node if its text contains one of these substrings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_if_contains: Vec<String>,
    /// Drop the node if any ancestor matches one of these selectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ancestors: Vec<String>,
}

impl NegativeFilters {
    pub fn is_empty(&self) -> bool {
        self.exclude_selectors.is_empty()
            && self.exclude_if_contains.is_empty()
            && self.exclude_ancestors.is_empty()
    }
}

/// How a container rule finds its candidate nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ContainerRuleKind {
    /// Query the tree with a CSS selector.
    Css { selector: String },
    /// Locate disclosure labels and walk up to their container.
    LabelLed {
        label_texts: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container_selector: Option<String>,
    },
    /// Match elements carrying an attribute, optionally with an exact value.
    Attribute {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ContainerRuleKind {
    /// The `type` tag as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContainerRuleKind::Css { .. } => "css",
            ContainerRuleKind::LabelLed { .. } => "label-led",
            ContainerRuleKind::Attribute { .. } => "attribute",
        }
    }
}

/// A rule that proposes container nodes with a base score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: ContainerRuleKind,
    pub score: f64,
    #[serde(flatten)]
    pub filters: NegativeFilters,
}

impl ContainerRule {
    pub fn css(selector: impl Into<String>, score: f64) -> Self {
        Self::from_kind(
            ContainerRuleKind::Css {
                selector: selector.into(),
            },
            score,
        )
    }

    pub fn label_led<S: Into<String>>(labels: impl IntoIterator<Item = S>, score: f64) -> Self {
        Self::from_kind(
            ContainerRuleKind::LabelLed {
                label_texts: labels.into_iter().map(Into::into).collect(),
                container_selector: None,
            },
            score,
        )
    }

    pub fn attribute(key: impl Into<String>, value: Option<&str>, score: f64) -> Self {
        Self::from_kind(
            ContainerRuleKind::Attribute {
                key: key.into(),
                value: value.map(str::to_string),
            },
            score,
        )
    }

    fn from_kind(kind: ContainerRuleKind, score: f64) -> Self {
        Self {
            id: None,
            kind,
            score,
            filters: NegativeFilters::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the container selector of a label-led rule; no-op for other kinds.
    pub fn within(mut self, container: impl Into<String>) -> Self {
        if let ContainerRuleKind::LabelLed {
            container_selector, ..
        } = &mut self.kind
        {
            *container_selector = Some(container.into());
        }
        self
    }

    pub fn with_filters(mut self, filters: NegativeFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Stable identifier: the explicit id, else `container-<index>-<type>`.
    pub fn rule_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("container-{}-{}", index, self.kind.type_name()),
        }
    }

    /// Every selector this rule carries, positive and negative.
    pub fn selectors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        match &self.kind {
            ContainerRuleKind::Css { selector } => out.push(selector),
            ContainerRuleKind::LabelLed {
                container_selector: Some(sel),
                ..
            } => out.push(sel),
            _ => {}
        }
        out.extend(self.filters.exclude_selectors.iter().map(String::as_str));
        out.extend(self.filters.exclude_ancestors.iter().map(String::as_str));
        out
    }
}

/// Post-processing applied to an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    Trim,
    Lowercase,
    /// Strip tracking query parameters from a URL.
    UrlClean,
}

/// One extractor in a field's fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub field: AdField,
    pub selector: String,
    /// Read this attribute instead of the text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl FieldRule {
    pub fn new(field: AdField, selector: impl Into<String>, score: f64) -> Self {
        Self {
            id: None,
            field,
            selector: selector.into(),
            attr: None,
            score,
            transform: None,
        }
    }

    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Stable identifier: the explicit id, else `field-<field>-<index>`.
    pub fn rule_id(&self, index: usize) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("field-{}-{}", self.field, index),
        }
    }
}

/// A weighted check over extracted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ValidationRule {
    /// The field must be present and non-empty.
    RequiredField { field: AdField, weight: f64 },
    /// The `label` field must match a case-insensitive regex.
    LabelPattern { pattern: String, weight: f64 },
    /// `destinationUrl` must be an absolute http(s) URL.
    UrlValid { weight: f64 },
    /// The field text must be at least `min_length` characters; partial credit below.
    MinTextLength {
        field: AdField,
        min_length: usize,
        weight: f64,
    },
    /// `advertiser` must look like a real name; partial credit for suspicious ones.
    AdvertiserName { weight: f64 },
}

impl ValidationRule {
    pub fn weight(&self) -> f64 {
        match self {
            ValidationRule::RequiredField { weight, .. }
            | ValidationRule::LabelPattern { weight, .. }
            | ValidationRule::UrlValid { weight }
            | ValidationRule::MinTextLength { weight, .. }
            | ValidationRule::AdvertiserName { weight } => *weight,
        }
    }

    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationRule::RequiredField { .. } => "required-field",
            ValidationRule::LabelPattern { .. } => "label-pattern",
            ValidationRule::UrlValid { .. } => "url-valid",
            ValidationRule::MinTextLength { .. } => "min-text-length",
            ValidationRule::AdvertiserName { .. } => "advertiser-name",
        }
    }

    /// The field this validator inspects.
    pub fn field(&self) -> AdField {
        match self {
            ValidationRule::RequiredField { field, .. }
            | ValidationRule::MinTextLength { field, .. } => *field,
            ValidationRule::LabelPattern { .. } => AdField::Label,
            ValidationRule::UrlValid { .. } => AdField::DestinationUrl,
            ValidationRule::AdvertiserName { .. } => AdField::Advertiser,
        }
    }
}

/// The complete, per-site detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub id: String,
    pub version: String,
    /// Site the rules target; defaults to the rule set id where a key is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub container_rules: Vec<ContainerRule>,
    pub field_rules: Vec<FieldRule>,
    #[serde(default)]
    pub validators: Vec<ValidationRule>,
    pub min_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_score_threshold: Option<f64>,
    #[serde(default)]
    pub adaptive_threshold: bool,
}

impl RuleSet {
    /// An empty rule set with the given id, useful as a starting point in code.
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            version: "1".to_string(),
            platform: None,
            container_rules: Vec::new(),
            field_rules: Vec::new(),
            validators: Vec::new(),
            min_confidence,
            container_score_threshold: None,
            adaptive_threshold: false,
        }
    }

    /// The registry / metrics key: `platform` if set, else `id`.
    pub fn platform_key(&self) -> &str {
        self.platform.as_deref().unwrap_or(&self.id)
    }

    /// Every CSS selector in the rule set, for precompilation.
    pub fn selectors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .container_rules
            .iter()
            .flat_map(|r| r.selectors())
            .collect();
        out.extend(self.field_rules.iter().map(|r| r.selector.as_str()));
        out
    }

    /// Returns true if at least one field rule targets `field`.
    pub fn has_extractor_for(&self, field: AdField) -> bool {
        self.field_rules.iter().any(|r| r.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RULES_JSON: &str = r#"{
        "id": "feed-ads",
        "version": "2024.1",
        "platform": "example.com",
        "containerRules": [
            { "type": "css", "selector": "article.promoted", "score": 0.9,
              "excludeSelectors": [".organic"], "excludeIfContains": ["Suggested"] },
            { "id": "label", "type": "label-led", "labelTexts": ["Promoted"],
              "containerSelector": "article", "score": 1.0 },
            { "type": "attribute", "key": "data-ad", "score": 0.7,
              "excludeAncestors": ["aside"] }
        ],
        "fieldRules": [
            { "field": "advertiser", "selector": "a.author", "score": 1.0 },
            { "field": "destinationUrl", "selector": "a.cta", "attr": "href",
              "score": 0.8, "transform": "url-clean" }
        ],
        "validators": [
            { "type": "required-field", "field": "advertiser", "weight": 0.5 },
            { "type": "min-text-length", "field": "body", "minLength": 20, "weight": 0.3 },
            { "type": "url-valid", "weight": 0.2 }
        ],
        "minConfidence": 0.5,
        "adaptiveThreshold": true
    }"#;

    #[test]
    fn test_deserialize_tagged_rules() {
        let rules: RuleSet = serde_json::from_str(RULES_JSON).expect("deserialize");
        assert_eq!(rules.id, "feed-ads");
        assert_eq!(rules.platform_key(), "example.com");
        assert_eq!(rules.container_rules.len(), 3);
        assert!(rules.adaptive_threshold);
        assert_eq!(rules.container_score_threshold, None);

        let css = &rules.container_rules[0];
        assert_eq!(
            css.kind,
            ContainerRuleKind::Css {
                selector: "article.promoted".to_string()
            }
        );
        assert_eq!(css.filters.exclude_selectors, vec![".organic"]);
        assert_eq!(css.filters.exclude_if_contains, vec!["Suggested"]);

        let label = &rules.container_rules[1];
        assert_eq!(
            label.kind,
            ContainerRuleKind::LabelLed {
                label_texts: vec!["Promoted".to_string()],
                container_selector: Some("article".to_string()),
            }
        );
        assert_eq!(label.rule_id(1), "label");
        assert_eq!(rules.container_rules[2].rule_id(2), "container-2-attribute");

        let url = &rules.field_rules[1];
        assert_eq!(url.attr.as_deref(), Some("href"));
        assert_eq!(url.transform, Some(Transform::UrlClean));
        assert_eq!(url.rule_id(1), "field-destinationUrl-1");

        assert_eq!(
            rules.validators[1],
            ValidationRule::MinTextLength {
                field: AdField::Body,
                min_length: 20,
                weight: 0.3
            }
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_wire_names() {
        let rules: RuleSet = serde_json::from_str(RULES_JSON).unwrap();
        let json = serde_json::to_value(&rules).unwrap();
        assert_eq!(json["containerRules"][1]["type"], "label-led");
        assert_eq!(json["containerRules"][1]["labelTexts"][0], "Promoted");
        assert_eq!(json["validators"][1]["minLength"], 20);
        let parsed: RuleSet = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, rules);
    }

    #[test]
    fn test_unknown_rule_type_is_rejected() {
        let json = r#"{ "type": "xpath", "selector": "//div", "score": 1.0 }"#;
        assert!(serde_json::from_str::<ContainerRule>(json).is_err());
    }

    #[test]
    fn test_selectors_cover_negative_filters() {
        let rule = ContainerRule::label_led(["Sponsored"], 1.0)
            .within("div[data-testid='tweet']")
            .with_filters(NegativeFilters {
                exclude_selectors: vec![".quoted".to_string()],
                exclude_if_contains: vec!["Ad-free".to_string()],
                exclude_ancestors: vec!["aside".to_string()],
            });
        assert_eq!(
            rule.selectors(),
            vec!["div[data-testid='tweet']", ".quoted", "aside"]
        );
    }

    #[test]
    fn test_validator_weight_and_field() {
        let v = ValidationRule::AdvertiserName { weight: 0.25 };
        assert_eq!(v.weight(), 0.25);
        assert_eq!(v.kind(), "advertiser-name");
        assert_eq!(v.field(), AdField::Advertiser);
    }
}
