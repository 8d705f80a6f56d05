//! The user-facing boundary of the journey.
//!
//! The engine never reads a terminal itself; every question goes through a
//! `JourneyPrompt`, so the CLI can plug in interactive prompts and tests
//! can script the answers.

use std::path::PathBuf;

use crate::scope::SubdirectoryPermissions;

use super::session::JourneySession;

/// Answer after the user reviewed a rule's change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Continue,
    Stop,
}

/// Answer to "has the change request been merged?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Move on to the next rule or stage.
    Merged,
    /// Run the same rule again.
    Reprocess,
    Stop,
}

/// Branch layout chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchAnswers {
    pub default_branch: String,
    pub release_branches: Vec<String>,
    pub feature_branch: String,
}

pub trait JourneyPrompt: Send + Sync {
    /// Repository to remediate. `suggested` is the detected root, if any.
    fn repo_root(&self, suggested: Option<&PathBuf>) -> std::io::Result<PathBuf>;

    fn branches(&self, current_branch: &str) -> std::io::Result<BranchAnswers>;

    fn permissions(&self) -> std::io::Result<SubdirectoryPermissions>;

    /// Called after a rule paused for review.
    fn review_complete(&self, rule: &str, change_request: &str) -> std::io::Result<ReviewDecision>;

    fn merge_decision(&self, rule: &str) -> std::io::Result<MergeDecision>;

    /// Ask the user to confirm a saved configuration, typically after the
    /// session expired.
    fn reconfirm(&self, session: &JourneySession) -> std::io::Result<bool>;
}
