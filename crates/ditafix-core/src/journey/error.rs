//! Error types for the journey module.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::RemedyError;

/// Errors produced by the journey state machine and its session store.
#[derive(Debug, thiserror::Error)]
pub enum JourneyError {
    #[error("session expired at {expired_at}; re-confirm the configuration to renew it")]
    SessionExpired { expired_at: DateTime<Utc> },

    #[error("session record {} is corrupt: {reason}{}", .path.display(), backup_hint(.backup))]
    SessionCorrupt {
        path: PathBuf,
        reason: String,
        backup: Option<PathBuf>,
    },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("journey is not configured")]
    NotConfigured,

    #[error("feature branch {branch} is the default or a release branch")]
    ProtectedBranch { branch: String },

    #[error("remediation error: {0}")]
    Remedy(#[from] RemedyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn backup_hint(backup: &Option<PathBuf>) -> String {
    match backup.as_deref().map(Path::display) {
        Some(p) => format!(" (newest backup: {p})"),
        None => String::new(),
    }
}

/// Result type for journey operations.
pub type JourneyResult<T> = std::result::Result<T, JourneyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_names_backup() {
        let err = JourneyError::SessionCorrupt {
            path: PathBuf::from("/cfg/ditafix/journey.json"),
            reason: "digest mismatch".into(),
            backup: Some(PathBuf::from("/cfg/ditafix/journey.json.20261016T101010123.bak")),
        };
        let msg = err.to_string();
        assert!(msg.contains("digest mismatch"));
        assert!(msg.contains("newest backup: /cfg/ditafix/journey.json.20261016T101010123.bak"));
    }

    #[test]
    fn test_remedy_error_converts() {
        let err: JourneyError = RemedyError::UnknownRule("X".into()).into();
        assert!(matches!(err, JourneyError::Remedy(RemedyError::UnknownRule(_))));
    }
}
