// ABOUTME: Pre-compiled CSS selector cache shared by the tree adapter and the config validator.
// ABOUTME: Parse failures are cached too, so a broken rule selector is only parsed once.

//! Selector caching for efficient repeated DOM queries.
//!
//! Every detection pass re-runs the same rule selectors against a fresh tree,
//! so selectors are compiled once per process and reused. Invalid selectors are
//! remembered together with the parser's message.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

use crate::error::DetectError;

type Compiled = Result<Selector, String>;

/// Thread-safe cache of compiled CSS selectors.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Compiled>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn compile(css: &str) -> Compiled {
    if css.trim().is_empty() {
        return Err("empty selector".to_string());
    }
    Selector::parse(css).map_err(|e| e.to_string())
}

fn into_result(css: &str, compiled: &Compiled) -> Result<Selector, DetectError> {
    match compiled {
        Ok(selector) => Ok(selector.clone()),
        Err(msg) => Err(DetectError::invalid_selector(
            css,
            "compile selector",
            Some(anyhow::anyhow!("{}", msg)),
        )),
    }
}

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns the compiled selector, or an `InvalidSelector` error carrying the
/// parser message. Subsequent calls with the same string hit the cache.
pub fn get_or_compile(css: &str) -> Result<Selector, DetectError> {
    // Fast path: poisoned locks still hold a usable map
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return into_result(css, cached);
        }
    }

    let compiled = compile(css);
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    let entry = cache.entry(css.to_string()).or_insert(compiled);
    into_result(css, entry)
}

/// Precompiles a batch of selectors into the cache.
///
/// The detector calls this once when a rule set is accepted.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            cache.insert(css.to_string(), compile(css));
        }
    }
}
