//! The persisted journey record.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{JourneyError, JourneyResult};
use super::state::JourneyState;
use crate::pass::PassOutcome;
use crate::scope::SubdirectoryPermissions;

/// How long a session stays resumable without re-confirmation.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Everything needed to resume a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySession {
    pub session_id: Uuid,
    pub repo_root: Option<PathBuf>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub release_branches: Vec<String>,
    #[serde(default)]
    pub subdirectory_permissions: SubdirectoryPermissions,
    pub feature_branch: Option<String>,
    /// URL or identifier of the open change request.
    #[serde(default)]
    pub change_request: Option<String>,
    pub state: JourneyState,
    pub current_stage: usize,
    pub current_rule: Option<String>,
    /// Set before a pass is committed; cleared once the feature branch is
    /// pushed and its change request updated.
    #[serde(default)]
    pub pending_publish: bool,
    /// Last rule committed for each file, relative to the repo root.
    #[serde(default)]
    pub per_file_cursor: BTreeMap<PathBuf, String>,
    #[serde(default)]
    pub completed_rules: Vec<String>,
    /// Outcomes of the rules committed in the current stage.
    #[serde(default)]
    pub stage_outcomes: Vec<PassOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl JourneySession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            repo_root: None,
            default_branch: None,
            release_branches: Vec::new(),
            subdirectory_permissions: SubdirectoryPermissions::default(),
            feature_branch: None,
            change_request: None,
            state: JourneyState::Unconfigured,
            current_stage: 0,
            current_rule: None,
            pending_publish: false,
            per_file_cursor: BTreeMap::new(),
            completed_rules: Vec::new(),
            stage_outcomes: Vec::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(SESSION_TTL_DAYS),
            notes: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Fail with `SessionExpired` once the window has passed.
    pub fn ensure_active(&self, now: DateTime<Utc>) -> JourneyResult<()> {
        if self.is_expired(now) {
            return Err(JourneyError::SessionExpired {
                expired_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Start a new expiry window after the user re-confirmed the
    /// configuration.
    pub fn renew(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + Duration::days(SESSION_TTL_DAYS);
        self.updated_at = now;
        self.note(now, "configuration re-confirmed; session renewed");
    }

    /// Apply a checked state transition.
    pub fn transition(&mut self, next: JourneyState, now: DateTime<Utc>) -> JourneyResult<()> {
        self.state = self.state.transition(next)?;
        self.updated_at = now;
        Ok(())
    }

    /// True for the default branch and every release branch. Remediation
    /// commits never land on these.
    pub fn is_protected_branch(&self, branch: &str) -> bool {
        self.default_branch.as_deref() == Some(branch)
            || self.release_branches.iter().any(|b| b == branch)
    }

    /// Record a committed pass of `rule` that changed `files`.
    pub fn record_commit(&mut self, rule: &str, files: &[PathBuf], now: DateTime<Utc>) {
        for file in files {
            self.per_file_cursor.insert(file.clone(), rule.to_string());
        }
        self.updated_at = now;
    }

    pub fn mark_rule_complete(&mut self, outcome: &PassOutcome) {
        if !self.completed_rules.iter().any(|r| r == &outcome.rule) {
            self.completed_rules.push(outcome.rule.clone());
        }
        self.stage_outcomes.retain(|o| o.rule != outcome.rule);
        let mut stored = outcome.clone();
        stored.remaining.clear();
        self.stage_outcomes.push(stored);
    }

    pub fn is_rule_complete(&self, rule: &str) -> bool {
        self.completed_rules.iter().any(|r| r == rule)
    }

    /// Append a timestamped human-readable note.
    pub fn note(&mut self, now: DateTime<Utc>, text: impl AsRef<str>) {
        self.notes
            .push(format!("{} {}", now.format("%Y-%m-%dT%H:%M:%SZ"), text.as_ref()));
    }

    pub fn repo_root(&self) -> JourneyResult<&PathBuf> {
        self.repo_root.as_ref().ok_or(JourneyError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FixTier;

    #[test]
    fn test_new_session_expires_in_seven_days() {
        let now = Utc::now();
        let s = JourneySession::new(now);
        assert_eq!(s.expires_at - s.created_at, Duration::days(7));
        assert!(!s.is_expired(now));
        assert!(s.is_expired(now + Duration::days(7)));
        assert!(matches!(
            s.ensure_active(now + Duration::days(8)),
            Err(JourneyError::SessionExpired { .. })
        ));
    }

    #[test]
    fn test_renew_extends_window() {
        let now = Utc::now();
        let mut s = JourneySession::new(now - Duration::days(10));
        assert!(s.is_expired(now));
        s.renew(now);
        assert!(!s.is_expired(now));
        assert_eq!(s.notes.len(), 1);
    }

    #[test]
    fn test_transition_checks_legality() {
        let now = Utc::now();
        let mut s = JourneySession::new(now);
        s.transition(JourneyState::ConfiguringRepo, now).unwrap();
        assert!(s.transition(JourneyState::Ready, now).is_err());
        assert_eq!(s.state, JourneyState::ConfiguringRepo);
    }

    #[test]
    fn test_record_commit_and_completion() {
        let now = Utc::now();
        let mut s = JourneySession::new(now);
        s.record_commit("EntityReference", &[PathBuf::from("a.adoc")], now);
        assert_eq!(s.per_file_cursor[&PathBuf::from("a.adoc")], "EntityReference");

        let outcome = PassOutcome::new("EntityReference", FixTier::Deterministic);
        s.mark_rule_complete(&outcome);
        s.mark_rule_complete(&outcome);
        assert_eq!(s.completed_rules, vec!["EntityReference".to_string()]);
        assert_eq!(s.stage_outcomes.len(), 1);
        assert!(s.is_rule_complete("EntityReference"));
    }

    #[test]
    fn test_protected_branches() {
        let mut s = JourneySession::new(Utc::now());
        s.default_branch = Some("main".into());
        s.release_branches = vec!["release-1.0".into()];
        assert!(s.is_protected_branch("main"));
        assert!(s.is_protected_branch("release-1.0"));
        assert!(!s.is_protected_branch("ditafix/remediation"));
    }

    #[test]
    fn test_sessions_saved_before_pending_publish_still_decode() {
        let s = JourneySession::new(Utc::now());
        let mut value = serde_json::to_value(&s).unwrap();
        value.as_object_mut().unwrap().remove("pending_publish");
        let decoded: JourneySession = serde_json::from_value(value).unwrap();
        assert!(!decoded.pending_publish);
    }

    #[test]
    fn test_not_configured() {
        let s = JourneySession::new(Utc::now());
        assert!(matches!(s.repo_root(), Err(JourneyError::NotConfigured)));
    }
}
