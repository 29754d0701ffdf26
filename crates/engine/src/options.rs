// ABOUTME: Tunable engine settings (DetectorOptions) and the fluent DetectorBuilder.
// ABOUTME: DetectorBuilder vets a rule set with the config validator before handing out a Detector.

use crate::engine::Detector;
use crate::error::DetectError;
use crate::rules::RuleSet;

/// Container threshold used when a rule set sets neither a fixed nor an adaptive one.
pub const DEFAULT_CONTAINER_THRESHOLD: f64 = 0.6;
/// How many parents the label locator walks looking for a container.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 10;
/// Longest text (in characters) still treated as a disclosure label.
pub const DEFAULT_MAX_LABEL_TEXT_LEN: usize = 64;
/// Score factor for labels found through aria attributes instead of text.
pub const DEFAULT_ARIA_LABEL_FACTOR: f64 = 0.95;

/// Configuration options for the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    pub default_threshold: f64,
    pub max_ancestor_depth: usize,
    pub max_label_text_len: usize,
    pub aria_label_factor: f64,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_CONTAINER_THRESHOLD,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
            max_label_text_len: DEFAULT_MAX_LABEL_TEXT_LEN,
            aria_label_factor: DEFAULT_ARIA_LABEL_FACTOR,
        }
    }
}

/// Builder for constructing Detector instances with custom configuration.
#[derive(Debug, Clone)]
pub struct DetectorBuilder {
    opts: DetectorOptions,
}

impl DetectorBuilder {
    /// Create a new DetectorBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: DetectorOptions::default(),
        }
    }

    /// Set the threshold used when the rule set configures none.
    pub fn default_threshold(mut self, threshold: f64) -> Self {
        self.opts.default_threshold = threshold;
        self
    }

    /// Set how far the label locator walks up looking for a container.
    pub fn max_ancestor_depth(mut self, depth: usize) -> Self {
        self.opts.max_ancestor_depth = depth;
        self
    }

    /// Set the longest text still considered a label.
    pub fn max_label_text_len(mut self, len: usize) -> Self {
        self.opts.max_label_text_len = len;
        self
    }

    /// Set the score factor for aria-label hits.
    pub fn aria_label_factor(mut self, factor: f64) -> Self {
        self.opts.aria_label_factor = factor;
        self
    }

    /// The options accumulated so far.
    pub fn options(&self) -> &DetectorOptions {
        &self.opts
    }

    /// Validate `rule_set` and build the Detector.
    ///
    /// Fails with a `Config` error if the rule set has validation errors.
    pub fn build(self, rule_set: RuleSet) -> Result<Detector, DetectError> {
        Detector::new(rule_set, self.opts)
    }
}

impl Default for DetectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
