//! Normalized linter violation types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Severity level reported by the linter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Suggestion,
    Warning,
    Error,
}

impl Severity {
    /// Parse a linter severity string, case-insensitively.
    ///
    /// Unknown levels map to `Warning`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Severity::Error,
            "suggestion" | "info" | "hint" => Severity::Suggestion,
            _ => Severity::Warning,
        }
    }
}

/// A single rule failure against one line of a document.
///
/// `line` is 1-based and refers to the buffer as it was when the linter ran,
/// before any edit of the current pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub file_path: PathBuf,
    pub line: usize,
    pub rule: String,
    pub message: String,
    pub severity: Severity,
    /// 1-based inclusive column range of the offending text, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
    /// Text the linter matched, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl Violation {
    pub fn new(
        file_path: impl Into<PathBuf>,
        line: usize,
        rule: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            rule: rule.into(),
            message: message.into(),
            severity,
            span: None,
            matched: None,
        }
    }

    /// Set the column span.
    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }

    /// Set the matched text.
    pub fn with_match(mut self, matched: impl Into<String>) -> Self {
        self.matched = Some(matched.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("error"), Severity::Error);
        assert_eq!(Severity::parse("ERROR"), Severity::Error);
        assert_eq!(Severity::parse("warning"), Severity::Warning);
        assert_eq!(Severity::parse("suggestion"), Severity::Suggestion);
        assert_eq!(Severity::parse("whatever"), Severity::Warning);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Suggestion < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_violation_builders() {
        let v = Violation::new("a.adoc", 4, "EntityReference", "msg", Severity::Error)
            .with_span(3, 9)
            .with_match("&mdash;");
        assert_eq!(v.span, Some((3, 9)));
        assert_eq!(v.matched.as_deref(), Some("&mdash;"));
        assert_eq!(v.line, 4);
    }
}
