// ABOUTME: The Detector: validates a rule set once, then runs container, field and validation phases per pass.
// ABOUTME: Produces AdCandidates in document order and optionally feeds a caller-owned metrics collector.

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::ConfigValidator;
use crate::detect::container::find_containers;
use crate::detect::debug::{generate_debug_info, DetectionDebugInfo};
use crate::detect::fields::extract_fields;
use crate::detect::validate::validate;
use crate::dom::compiled::precompile_selectors;
use crate::dom::tree::DocumentTree;
use crate::error::DetectError;
use crate::metrics::MetricsCollector;
use crate::options::{DetectorBuilder, DetectorOptions};
use crate::result::{AdCandidate, ContainerMatch, Placement};
use crate::rules::RuleSet;

/// Runs detection passes for one accepted rule set.
///
/// A `Detector` only exists for rule sets without configuration errors. A pass
/// never fails: rules that misbehave at match time are logged and skipped.
#[derive(Debug, Clone)]
pub struct Detector {
    rule_set: RuleSet,
    opts: DetectorOptions,
}

impl Detector {
    /// Create a new DetectorBuilder for configuring the detector.
    pub fn builder() -> DetectorBuilder {
        DetectorBuilder::new()
    }

    /// Validate `rule_set` and create a detector with the given options.
    pub fn new(rule_set: RuleSet, opts: DetectorOptions) -> Result<Self, DetectError> {
        let report = ConfigValidator::new().validate(&rule_set);
        for warning in &report.warnings {
            warn!(rule_set = %rule_set.id, %warning, "rule set warning");
        }
        if !report.valid {
            return Err(DetectError::config(
                &rule_set.id,
                "validate rule set",
                Some(anyhow::anyhow!(report.errors.join("; "))),
            ));
        }

        precompile_selectors(rule_set.selectors());
        Ok(Self { rule_set, opts })
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.opts
    }

    /// Phase 1 only: thresholded container matches in document order.
    pub fn find_containers<T: DocumentTree>(&self, tree: &T) -> Vec<ContainerMatch<T::Node>> {
        find_containers(&self.rule_set, tree, &self.opts)
    }

    /// Runs a full pass and returns the accepted candidates in document order.
    pub fn detect<T: DocumentTree>(&self, tree: &T) -> Vec<AdCandidate<T::Node>> {
        self.run(tree, |_| true, None)
    }

    /// Like [`Detector::detect`], skipping containers for which `keep` returns
    /// false before any field is extracted. Hosts use this to skip containers
    /// they already processed in an earlier pass.
    pub fn detect_filtered<T, F>(&self, tree: &T, keep: F) -> Vec<AdCandidate<T::Node>>
    where
        T: DocumentTree,
        F: FnMut(&ContainerMatch<T::Node>) -> bool,
    {
        self.run(tree, keep, None)
    }

    /// Runs a full pass, recording every container and field rule outcome.
    pub fn detect_with_metrics<T: DocumentTree>(
        &self,
        tree: &T,
        metrics: &mut MetricsCollector,
    ) -> Vec<AdCandidate<T::Node>> {
        self.run(tree, |_| true, Some(metrics))
    }

    /// Explains how a pass treats `node`.
    pub fn debug_info<T: DocumentTree>(&self, tree: &T, node: T::Node) -> DetectionDebugInfo {
        generate_debug_info(tree, node, &self.rule_set, &self.opts)
    }

    fn run<T, F>(
        &self,
        tree: &T,
        mut keep: F,
        mut metrics: Option<&mut MetricsCollector>,
    ) -> Vec<AdCandidate<T::Node>>
    where
        T: DocumentTree,
        F: FnMut(&ContainerMatch<T::Node>) -> bool,
    {
        let containers = self.find_containers(tree);
        let total = containers.len();
        let mut accepted: Vec<AdCandidate<T::Node>> = Vec::new();

        for container in containers.into_iter().filter(|c| keep(c)) {
            let (fields, field_extractions) = extract_fields(
                tree,
                container.node,
                &self.rule_set.field_rules,
                container.label_node,
            );
            let validation = validate(
                &fields,
                &self.rule_set.validators,
                self.rule_set.min_confidence,
            );

            if let Some(m) = metrics.as_deref_mut() {
                m.record_container_match(&container.rule_id, validation.valid, validation.confidence);
                for attempt in &field_extractions {
                    m.record_field_match(&attempt.rule_id, attempt.succeeded(), attempt.score);
                }
            }

            if !validation.valid {
                debug!(
                    node = %tree.describe(container.node),
                    confidence = validation.confidence,
                    "candidate rejected"
                );
                continue;
            }

            let placement = Placement {
                index: accepted.len(),
                depth: tree.depth(container.node),
                path: tree.tag_path(container.node),
            };
            accepted.push(AdCandidate {
                node: container.node,
                container_match: container,
                fields,
                field_extractions,
                validation,
                detected_at: Utc::now(),
                placement,
            });
        }

        if let Some(m) = metrics {
            m.record_detections(accepted.len());
        }
        debug!(
            rule_set = %self.rule_set.id,
            containers = total,
            accepted = accepted.len(),
            "detection pass complete"
        );
        accepted
    }
}
