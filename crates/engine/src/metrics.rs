// ABOUTME: Selector performance metrics: per-rule match counts, rolling confidence and success rates.
// ABOUTME: An explicit, caller-owned collector with JSON export/import and load/flush to a file.

//! Advisory metrics about how well each rule performs over time.
//!
//! Detection never depends on these numbers. A host owns one
//! [`MetricsCollector`] per platform (wrapping it in a mutex if passes run
//! concurrently), hands it to [`crate::Detector::detect_with_metrics`], and
//! persists it explicitly with [`MetricsCollector::flush`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// Maximum number of rules tracked before pruning.
pub const DEFAULT_METRICS_CAPACITY: usize = 500;

/// Matches a rule needs before it can be reported as problematic.
pub const MIN_MATCHES_FOR_PROBLEMATIC: u64 = 5;

/// Running statistics for one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorPerformanceMetric {
    pub rule_id: String,
    /// `container` or `field`.
    pub rule_type: String,
    pub times_matched: u64,
    pub times_validated: u64,
    pub average_confidence: f64,
    pub last_used: DateTime<Utc>,
    pub success_rate: f64,
}

impl SelectorPerformanceMetric {
    fn new(rule_id: &str, rule_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            rule_type: rule_type.to_string(),
            times_matched: 0,
            times_validated: 0,
            average_confidence: 0.0,
            last_used: now,
            success_rate: 0.0,
        }
    }

    fn record(&mut self, validated: bool, sample: f64, now: DateTime<Utc>) {
        self.times_matched += 1;
        if validated {
            self.times_validated += 1;
        }
        let n = self.times_matched as f64;
        self.average_confidence = (self.average_confidence * (n - 1.0) + sample) / n;
        self.success_rate = self.times_validated as f64 / n;
        self.last_used = now;
    }
}

/// A flat snapshot of a collector, safe to store anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExport {
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub total_detections: u64,
    pub metrics: Vec<SelectorPerformanceMetric>,
}

/// Accumulates rule metrics across detection passes.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    platform: String,
    capacity: usize,
    total_detections: u64,
    metrics: HashMap<String, SelectorPerformanceMetric>,
}

/// Most used first, then most recently used.
fn by_usage(a: &SelectorPerformanceMetric, b: &SelectorPerformanceMetric) -> Ordering {
    b.times_matched
        .cmp(&a.times_matched)
        .then_with(|| b.last_used.cmp(&a.last_used))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

impl MetricsCollector {
    pub fn new(platform: impl Into<String>) -> Self {
        Self::with_capacity(platform, DEFAULT_METRICS_CAPACITY)
    }

    pub fn with_capacity(platform: impl Into<String>, capacity: usize) -> Self {
        Self {
            platform: platform.into(),
            capacity,
            total_detections: 0,
            metrics: HashMap::new(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn get(&self, rule_id: &str) -> Option<&SelectorPerformanceMetric> {
        self.metrics.get(rule_id)
    }

    fn record(&mut self, rule_id: &str, rule_type: &str, validated: bool, sample: f64) {
        let now = Utc::now();
        let is_new = !self.metrics.contains_key(rule_id);
        self.metrics
            .entry(rule_id.to_string())
            .or_insert_with(|| SelectorPerformanceMetric::new(rule_id, rule_type, now))
            .record(validated, sample, now);
        if is_new {
            self.prune();
        }
    }

    /// Records a container rule match and whether its candidate validated.
    pub fn record_container_match(&mut self, rule_id: &str, validated: bool, confidence: f64) {
        self.record(rule_id, "container", validated, confidence);
    }

    /// Records a field rule attempt. A miss counts as a match that did not
    /// validate, with a zero score sample.
    pub fn record_field_match(&mut self, rule_id: &str, found: bool, score: f64) {
        let sample = if found { score } else { 0.0 };
        self.record(rule_id, "field", found, sample);
    }

    /// Adds accepted candidates from one pass to the running total.
    pub fn record_detections(&mut self, count: usize) {
        self.total_detections += count as u64;
    }

    fn prune(&mut self) {
        if self.metrics.len() <= self.capacity {
            return;
        }
        let mut all: Vec<SelectorPerformanceMetric> = self.metrics.drain().map(|(_, m)| m).collect();
        all.sort_by(by_usage);
        all.truncate(self.capacity);
        self.metrics = all.into_iter().map(|m| (m.rule_id.clone(), m)).collect();
    }

    /// Rules with at least five matches whose success rate is below `threshold`,
    /// worst first.
    pub fn problematic_rules(&self, threshold: f64) -> Vec<&SelectorPerformanceMetric> {
        let mut out: Vec<&SelectorPerformanceMetric> = self
            .metrics
            .values()
            .filter(|m| m.times_matched >= MIN_MATCHES_FOR_PROBLEMATIC && m.success_rate < threshold)
            .collect();
        out.sort_by(|a, b| {
            a.success_rate
                .partial_cmp(&b.success_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        out
    }

    /// The `n` most used rules.
    pub fn top_rules(&self, n: usize) -> Vec<&SelectorPerformanceMetric> {
        let mut out: Vec<&SelectorPerformanceMetric> = self.metrics.values().collect();
        out.sort_by(|a, b| by_usage(a, b));
        out.truncate(n);
        out
    }

    /// Rules not used in the last `days` days.
    pub fn stale_rules(&self, days: i64) -> Vec<&SelectorPerformanceMetric> {
        self.stale_rules_at(days, Utc::now())
    }

    /// Rules not used in the `days` days before `now`, oldest first.
    ///
    /// A window reaching past the representable date range marks nothing stale.
    pub fn stale_rules_at(&self, days: i64, now: DateTime<Utc>) -> Vec<&SelectorPerformanceMetric> {
        let Some(cutoff) = TimeDelta::try_days(days).and_then(|d| now.checked_sub_signed(d)) else {
            return Vec::new();
        };
        let mut out: Vec<&SelectorPerformanceMetric> = self
            .metrics
            .values()
            .filter(|m| m.last_used < cutoff)
            .collect();
        out.sort_by(|a, b| a.last_used.cmp(&b.last_used).then_with(|| a.rule_id.cmp(&b.rule_id)));
        out
    }

    /// Snapshot of the collector, metrics ordered by rule id.
    pub fn export_metrics(&self) -> MetricsExport {
        let mut metrics: Vec<SelectorPerformanceMetric> = self.metrics.values().cloned().collect();
        metrics.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        MetricsExport {
            timestamp: Utc::now(),
            platform: self.platform.clone(),
            total_detections: self.total_detections,
            metrics,
        }
    }

    /// Merges a snapshot: imported entries replace same-id entries and the
    /// detection count is added.
    pub fn import_metrics(&mut self, export: MetricsExport) {
        if self.platform.is_empty() {
            self.platform = export.platform;
        }
        self.total_detections += export.total_detections;
        for metric in export.metrics {
            self.metrics.insert(metric.rule_id.clone(), metric);
        }
        self.prune();
    }

    /// Loads a collector from a snapshot file; a missing file yields an empty collector.
    pub fn load(path: impl AsRef<Path>, platform: impl Into<String>) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let mut collector = Self::new(platform);
        if !path.exists() {
            return Ok(collector);
        }
        let display = path.display().to_string();
        let json = fs::read_to_string(path)
            .map_err(|e| DetectError::io(&display, "read metrics", Some(e.into())))?;
        let export: MetricsExport = serde_json::from_str(&json)
            .map_err(|e| DetectError::serialization(&display, "parse metrics", Some(e.into())))?;
        collector.import_metrics(export);
        Ok(collector)
    }

    /// Writes the current snapshot to `path` as pretty JSON.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<(), DetectError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let json = serde_json::to_string_pretty(&self.export_metrics())
            .map_err(|e| DetectError::serialization(&display, "encode metrics", Some(e.into())))?;
        fs::write(path, json).map_err(|e| DetectError::io(&display, "write metrics", Some(e.into())))
    }
}
