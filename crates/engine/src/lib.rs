// ABOUTME: Main library entry point for the adsift advertisement detection engine.
// ABOUTME: Re-exports the public API: Detector, DetectorBuilder, RuleSet, HtmlTree, AdCandidate, DetectError.

//! adsift - rule-driven detection of advertisements in rendered web pages.
//!
//! A per-site [`RuleSet`] drives a three-phase pass over any
//! [`DocumentTree`]: container rules propose scored subtrees, field rules
//! extract advertiser, headline, destination and media, and weighted
//! validators turn the fields into a confidence.
//!
//! # Example
//!
//! ```
//! use adsift_engine::{load_default_rule_set, Detector, DetectError, HtmlTree};
//!
//! fn main() -> Result<(), DetectError> {
//!     let detector = Detector::builder().build(load_default_rule_set())?;
//!     let tree = HtmlTree::parse_document(
//!         r#"<article><span>Sponsored</span>
//!            <a rel="author">Acme Corp</a>
//!            <a class="cta" href="https://acme.test/?utm_source=feed">Shop</a></article>"#,
//!     );
//!     for ad in detector.detect(&tree) {
//!         println!("{:?} {:.2}", ad.fields.advertiser, ad.validation.confidence);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod dom;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod options;
pub mod result;
pub mod rules;

pub use crate::config::{ConfigReport, ConfigValidator};
pub use crate::detect::debug::{generate_debug_info, DetectionDebugInfo};
pub use crate::dom::{DocumentTree, HtmlTree};
pub use crate::engine::Detector;
pub use crate::error::{DetectError, ErrorCode};
pub use crate::metrics::{MetricsCollector, MetricsExport, SelectorPerformanceMetric};
pub use crate::options::{DetectorBuilder, DetectorOptions};
pub use crate::result::{
    AdCandidate, ContainerMatch, FieldData, FieldExtraction, Placement, ValidationResult,
};
pub use crate::rules::loader::{from_json_str, from_path, load_default_rule_set, RuleSetRegistry};
pub use crate::rules::{
    AdField, ContainerRule, ContainerRuleKind, FieldRule, NegativeFilters, RuleSet, Transform,
    ValidationRule,
};
