use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RequiredMissing,
    PatternMismatch,
    TooShort,
    TooLong,
    BelowMin,
    AboveMax,
    /// A declared sync validator (or the schema adapter) rejected the value.
    RuleViolation,
    /// An async validator resolved with a rejection message.
    AsyncValidatorFailure,
    /// A validator panicked, or an async one returned an error instead of a
    /// verdict.
    AsyncValidatorThrew,
    /// Set through `FormEngine::set_error`.
    Manual,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::RequiredMissing => "required",
            ErrorKind::PatternMismatch => "pattern",
            ErrorKind::TooShort => "min_length",
            ErrorKind::TooLong => "max_length",
            ErrorKind::BelowMin => "min",
            ErrorKind::AboveMax => "max",
            ErrorKind::RuleViolation => "validate",
            ErrorKind::AsyncValidatorFailure => "validate_async",
            ErrorKind::AsyncValidatorThrew => "validator_threw",
            ErrorKind::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// The single active error of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Name of the declared validator that produced the error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rule: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}
