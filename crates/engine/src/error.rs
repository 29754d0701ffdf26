// ABOUTME: Error types for the detection engine including ErrorCode enum and DetectError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Error codes representing different categories of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A selector in a rule failed to parse.
    InvalidSelector,
    /// A single rule is malformed (out-of-range score, bad pattern, ...).
    InvalidRule,
    /// A whole rule set failed config validation.
    Config,
    /// Reading or writing a file failed.
    Io,
    /// A rule set or metrics snapshot could not be (de)serialized.
    Serialization,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidSelector => "invalid selector",
            ErrorCode::InvalidRule => "invalid rule",
            ErrorCode::Config => "config error",
            ErrorCode::Io => "io error",
            ErrorCode::Serialization => "serialization error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for engine operations.
///
/// `subject` names what the error is about: a rule id, a selector, a rule set
/// id or a file path, depending on `code`.
#[derive(Debug, thiserror::Error)]
pub struct DetectError {
    pub code: ErrorCode,
    pub subject: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adsift: {} {}: {}", self.op, self.subject, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl DetectError {
    fn new(
        code: ErrorCode,
        subject: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            subject: subject.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidSelector error.
    pub fn invalid_selector(
        selector: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidSelector, selector, op, source)
    }

    /// Create an InvalidRule error.
    pub fn invalid_rule(
        rule_id: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidRule, rule_id, op, source)
    }

    /// Create a Config error.
    pub fn config(
        rule_set_id: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Config, rule_set_id, op, source)
    }

    /// Create an Io error.
    pub fn io(
        path: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Io, path, op, source)
    }

    /// Create a Serialization error.
    pub fn serialization(
        subject: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Serialization, subject, op, source)
    }

    /// Returns true if this is an InvalidSelector error.
    pub fn is_invalid_selector(&self) -> bool {
        self.code == ErrorCode::InvalidSelector
    }

    /// Returns true if this is an InvalidRule error.
    pub fn is_invalid_rule(&self) -> bool {
        self.code == ErrorCode::InvalidRule
    }

    /// Returns true if this is a Config error.
    pub fn is_config(&self) -> bool {
        self.code == ErrorCode::Config
    }

    /// Returns true if this is an Io error.
    pub fn is_io(&self) -> bool {
        self.code == ErrorCode::Io
    }

    /// Returns true if this is a Serialization error.
    pub fn is_serialization(&self) -> bool {
        self.code == ErrorCode::Serialization
    }
}
