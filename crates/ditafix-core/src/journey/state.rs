//! Journey states and the legal moves between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{JourneyError, JourneyResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JourneyState {
    Unconfigured,
    ConfiguringRepo,
    ConfiguringBranches,
    ConfiguringPermissions,
    Ready,
    RunningStage { stage: usize },
    AwaitingUserReview { rule: String },
    AwaitingMergeConfirmation { rule: String },
    StageComplete { stage: usize },
    AllStagesComplete,
}

impl JourneyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AllStagesComplete)
    }

    /// Whether configuration has been completed.
    pub fn is_configured(&self) -> bool {
        !matches!(
            self,
            Self::Unconfigured
                | Self::ConfiguringRepo
                | Self::ConfiguringBranches
                | Self::ConfiguringPermissions
        )
    }

    pub fn can_transition_to(&self, next: &JourneyState) -> bool {
        use JourneyState::*;
        match (self, next) {
            (Unconfigured, ConfiguringRepo)
            | (ConfiguringRepo, ConfiguringBranches)
            | (ConfiguringBranches, ConfiguringPermissions)
            | (ConfiguringPermissions, Ready)
            | (Ready, ConfiguringRepo)
            | (Ready, RunningStage { .. })
            | (StageComplete { .. }, AllStagesComplete) => true,
            (RunningStage { .. }, AwaitingUserReview { .. }) => true,
            (RunningStage { stage: a }, RunningStage { stage: b }) => a == b,
            (RunningStage { stage: a }, StageComplete { stage: b }) => a == b,
            (AwaitingUserReview { rule: a }, AwaitingMergeConfirmation { rule: b }) => a == b,
            (AwaitingMergeConfirmation { .. }, RunningStage { .. }) => true,
            (AwaitingMergeConfirmation { .. }, StageComplete { .. }) => true,
            (StageComplete { stage: a }, RunningStage { stage: b }) => *b == a + 1,
            _ => false,
        }
    }

    /// Move to `next`, or fail with `InvalidTransition`.
    pub fn transition(&self, next: JourneyState) -> JourneyResult<JourneyState> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(JourneyError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for JourneyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::ConfiguringRepo => write!(f, "configuring_repo"),
            Self::ConfiguringBranches => write!(f, "configuring_branches"),
            Self::ConfiguringPermissions => write!(f, "configuring_permissions"),
            Self::Ready => write!(f, "ready"),
            Self::RunningStage { stage } => write!(f, "running_stage({stage})"),
            Self::AwaitingUserReview { rule } => write!(f, "awaiting_user_review({rule})"),
            Self::AwaitingMergeConfirmation { rule } => {
                write!(f, "awaiting_merge_confirmation({rule})")
            }
            Self::StageComplete { stage } => write!(f, "stage_complete({stage})"),
            Self::AllStagesComplete => write!(f, "all_stages_complete"),
        }
    }
}
