// ABOUTME: Result types produced by a detection pass: container matches, field data, validation, candidates.
// ABOUTME: Node-carrying types are generic over the tree's node handle; the rest serialize to JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::AdField;

/// A scored container node proposed by one container rule (phase 1 output).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerMatch<N> {
    pub node: N,
    pub rule_id: String,
    pub score: f64,
    /// The disclosure label that led to this container, for label-led rules.
    pub label_node: Option<N>,
    pub label_confidence: Option<f64>,
}

impl<N> ContainerMatch<N> {
    pub fn new(node: N, rule_id: impl Into<String>, score: f64) -> Self {
        Self {
            node,
            rule_id: rule_id.into(),
            score,
            label_node: None,
            label_confidence: None,
        }
    }
}

/// Values extracted from one container. Absent fields are normal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

impl FieldData {
    fn text_slot(&mut self, field: AdField) -> Option<&mut Option<String>> {
        match field {
            AdField::Label => Some(&mut self.label),
            AdField::Advertiser => Some(&mut self.advertiser),
            AdField::AdvertiserHandle => Some(&mut self.advertiser_handle),
            AdField::Headline => Some(&mut self.headline),
            AdField::Body => Some(&mut self.body),
            AdField::Cta => Some(&mut self.cta),
            AdField::DestinationUrl => Some(&mut self.destination_url),
            AdField::Images | AdField::Videos => None,
        }
    }

    /// The value of a text field; media fields return their first entry.
    pub fn get(&self, field: AdField) -> Option<&str> {
        match field {
            AdField::Label => self.label.as_deref(),
            AdField::Advertiser => self.advertiser.as_deref(),
            AdField::AdvertiserHandle => self.advertiser_handle.as_deref(),
            AdField::Headline => self.headline.as_deref(),
            AdField::Body => self.body.as_deref(),
            AdField::Cta => self.cta.as_deref(),
            AdField::DestinationUrl => self.destination_url.as_deref(),
            AdField::Images => self.images.first().map(String::as_str),
            AdField::Videos => self.videos.first().map(String::as_str),
        }
    }

    /// Stores `values` for `field`: the first one for text fields, all of them for media.
    pub fn set(&mut self, field: AdField, values: Vec<String>) {
        match field {
            AdField::Images => self.images = values,
            AdField::Videos => self.videos = values,
            _ => {
                if let Some(slot) = self.text_slot(field) {
                    *slot = values.into_iter().next();
                }
            }
        }
    }

    /// Returns true if the field holds a non-empty value.
    pub fn has(&self, field: AdField) -> bool {
        match field {
            AdField::Images => !self.images.is_empty(),
            AdField::Videos => !self.videos.is_empty(),
            _ => self.get(field).map(|v| !v.trim().is_empty()).unwrap_or(false),
        }
    }

    /// Returns true if any media was extracted.
    pub fn has_media(&self) -> bool {
        !self.images.is_empty() || !self.videos.is_empty()
    }
}

/// One attempt of one field rule against one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldExtraction {
    pub field: AdField,
    pub rule_id: String,
    pub selector: String,
    pub score: f64,
    /// First extracted value, if any.
    pub value: Option<String>,
    /// How many nodes the selector matched inside the container.
    pub matched_nodes: usize,
    /// Whether the value was chosen by distance to the label node.
    pub used_context: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldExtraction {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }
}

/// Outcome of one validator (or one heuristic field check).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOutcome {
    pub kind: String,
    pub field: AdField,
    pub passed: bool,
    pub awarded: f64,
    pub weight: f64,
    pub message: String,
}

/// Aggregated validation of one candidate's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    /// Awarded / possible score per field inspected by at least one check.
    pub field_scores: BTreeMap<AdField, f64>,
    pub checks: Vec<ValidatorOutcome>,
}

/// Where an accepted candidate sits in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Position among the pass's accepted candidates, in document order.
    pub index: usize,
    /// Element depth below the root.
    pub depth: usize,
    /// Tag path from the root, e.g. `html > body > main > article`.
    pub path: String,
}

/// An accepted advertisement: the engine's output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AdCandidate<N> {
    pub node: N,
    pub container_match: ContainerMatch<N>,
    pub fields: FieldData,
    pub field_extractions: Vec<FieldExtraction>,
    pub validation: ValidationResult,
    pub detected_at: DateTime<Utc>,
    pub placement: Placement,
}
