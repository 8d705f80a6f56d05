//! Domain-level error taxonomy for the remediation engine.

use std::path::PathBuf;

/// Errors produced while decoding linter output.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("linter output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("linter output does not match a known schema: {0}")]
    UnknownSchema(String),

    #[error("violation in {file} has invalid line number {line}")]
    InvalidLine { file: String, line: i64 },
}

/// Remediation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("patch conflict in {file}: {detail}")]
    PatchConflict { file: PathBuf, detail: String },

    #[error("unresolved deterministic violation of {rule} at {file}:{line}")]
    UnresolvedDeterministicViolation {
        file: PathBuf,
        line: usize,
        rule: String,
    },

    #[error("invalid content type value: {value:?}")]
    InvalidContentTypeValue { value: String },

    #[error("linter error: {0}")]
    Linter(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemedyError {
    /// Whether the error only affects one file or violation and the pass
    /// may continue with the rest of its scope.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::PatchConflict { .. }
                | Self::UnresolvedDeterministicViolation { .. }
                | Self::InvalidContentTypeValue { .. }
        )
    }
}

/// Result type for remediation operations.
pub type Result<T> = std::result::Result<T, RemedyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_conflict_display() {
        let err = RemedyError::PatchConflict {
            file: PathBuf::from("modules/con_intro.adoc"),
            detail: "replace 3..=4 overlaps replace 4..=4".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("con_intro.adoc"));
        assert!(msg.contains("overlaps"));
    }

    #[test]
    fn test_local_errors() {
        assert!(RemedyError::InvalidContentTypeValue {
            value: "FOO".into()
        }
        .is_local());
        assert!(RemedyError::UnresolvedDeterministicViolation {
            file: PathBuf::from("a.adoc"),
            line: 3,
            rule: "EntityReference".into(),
        }
        .is_local());
        assert!(!RemedyError::UnknownRule("Nope".into()).is_local());
        assert!(!RemedyError::Linter("container exited".into()).is_local());
    }

    #[test]
    fn test_parse_error_wraps() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RemedyError = ParseError::from(json_err).into();
        assert!(err.to_string().starts_with("parse error"));
    }
}
