//! Fix rule and stage definitions.

use serde::{Deserialize, Serialize};

/// How reliably a rule's violations can be corrected without a human.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixTier {
    /// Every violation has a mechanical fix; the pass reruns to verify.
    Deterministic,
    /// Some violations can be fixed, the rest are flagged for review.
    Partial,
    /// Violations are only flagged; a human decides the fix.
    NonDeterministic,
}

impl FixTier {
    /// Whether a pass of this tier stops for human review.
    pub fn requires_review(&self) -> bool {
        !matches!(self, FixTier::Deterministic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixTier::Deterministic => "deterministic",
            FixTier::Partial => "partial",
            FixTier::NonDeterministic => "non_deterministic",
        }
    }
}

/// Static description of one rule's remediation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixRule {
    pub name: String,
    pub tier: FixTier,
    /// Rule that must be complete before this one touches a file.
    pub dependency: Option<String>,
    /// Short instruction written into flag comments.
    pub instruction: String,
    /// Name of the journey stage this rule belongs to.
    pub stage: String,
}

/// An ordered group of rules sharing a dependency precondition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageDefinition {
    pub name: String,
    pub rules: Vec<String>,
    /// The stage only establishes prerequisites for later stages.
    pub prerequisite_only: bool,
}
