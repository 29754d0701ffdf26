// ABOUTME: Loads rule sets from JSON strings or files and keeps them in a per-platform registry.
// ABOUTME: Provides load_default_rule_set() for the embedded generic "Sponsored/Promoted" rules.

//! Rule set loading.
//!
//! Rule sets are data, authored outside the engine. This module only turns
//! JSON documents into [`RuleSet`] values and indexes them by platform; it does
//! not vet them. Run [`crate::config::ConfigValidator`] (or build a
//! [`crate::Detector`], which does) before trusting a loaded rule set.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::DetectError;
use crate::rules::RuleSet;

/// Embedded JSON containing the generic rule set.
const DEFAULT_RULES_JSON: &str = include_str!("../../data/default_rules.json");

/// Parses a rule set from a JSON string.
pub fn from_json_str(json: &str) -> Result<RuleSet, DetectError> {
    serde_json::from_str(json).map_err(|e| {
        DetectError::serialization("<inline>", "parse rule set", Some(anyhow::Error::new(e)))
    })
}

/// Reads and parses a rule set from a JSON file.
pub fn from_path(path: impl AsRef<Path>) -> Result<RuleSet, DetectError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let json = fs::read_to_string(path)
        .map_err(|e| DetectError::io(&display, "read rule set", Some(anyhow::Error::new(e))))?;
    serde_json::from_str(&json).map_err(|e| {
        DetectError::serialization(&display, "parse rule set", Some(anyhow::Error::new(e)))
    })
}

/// Loads the embedded generic rule set.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn load_default_rule_set() -> RuleSet {
    serde_json::from_str(DEFAULT_RULES_JSON).expect("failed to parse default rule set")
}

/// Registry for looking up rule sets by platform.
#[derive(Debug, Default, Clone)]
pub struct RuleSetRegistry {
    map: HashMap<String, RuleSet>,
}

impl RuleSetRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule set under its platform key, replacing any previous one.
    pub fn register(&mut self, rule_set: RuleSet) {
        self.map.insert(rule_set.platform_key().to_string(), rule_set);
    }

    /// Looks up a rule set by platform.
    pub fn get(&self, platform: &str) -> Option<&RuleSet> {
        self.map.get(platform)
    }

    /// Registers every `*.json` file in `dir`.
    ///
    /// Returns the number of rule sets loaded. Stops at the first unreadable
    /// or malformed file.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, DetectError> {
        let dir = dir.as_ref();
        let display = dir.display().to_string();
        let entries = fs::read_dir(dir)
            .map_err(|e| DetectError::io(&display, "read rule directory", Some(e.into())))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| DetectError::io(&display, "read rule directory", Some(e.into())))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            self.register(from_path(path)?);
        }
        Ok(paths.len())
    }

    /// Returns the number of registered platforms.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no rule sets are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
