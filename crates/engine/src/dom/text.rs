// ABOUTME: Text helpers: whitespace normalization and whole-word, case-insensitive label matching.
// ABOUTME: LabelMatcher compiles a rule's label texts into one regex with explicit word boundaries.

use regex::Regex;

/// Normalizes whitespace in a string by collapsing runs of whitespace into single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Matches any of a set of label texts as whole words, ignoring case.
///
/// Word boundaries are "not a letter, digit or underscore", so labels that
/// start or end with punctuation (`"Ad ·"`) still match.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    re: Regex,
    exact: Regex,
}

impl LabelMatcher {
    /// Builds a matcher for the non-empty entries of `labels`.
    ///
    /// Returns `None` when no label has any content.
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Option<Self> {
        let alternatives: Vec<String> = labels
            .iter()
            .map(|l| normalize_whitespace(l.as_ref()))
            .filter(|l| !l.is_empty())
            .map(|l| regex::escape(&l))
            .collect();
        if alternatives.is_empty() {
            return None;
        }
        let alternatives = alternatives.join("|");
        let pattern = format!(
            r"(?i)(?:^|[^\p{{L}}\p{{N}}_])(?:{})(?:$|[^\p{{L}}\p{{N}}_])",
            alternatives
        );
        let exact = format!(r"(?i)^[^\p{{L}}\p{{N}}]*(?:{})[^\p{{L}}\p{{N}}]*$", alternatives);
        Some(Self {
            re: Regex::new(&pattern).ok()?,
            exact: Regex::new(&exact).ok()?,
        })
    }

    /// Returns true if `text` contains one of the labels as a whole word.
    pub fn is_match(&self, text: &str) -> bool {
        self.re.is_match(text)
    }

    /// Returns true if `text` is one of the labels and nothing else,
    /// ignoring case and surrounding punctuation.
    pub fn is_exact(&self, text: &str) -> bool {
        self.exact.is_match(text)
    }
}
