//! Resumable remediation journey.
//!
//! A journey walks every stage of the rule registry, one rule at a time,
//! committing each pass to a feature branch and pausing for human review
//! where the rule's tier requires it. The session is persisted after every
//! transition so a run can stop at any point and pick up later.

pub mod engine;
pub mod error;
pub mod prompt;
pub mod session;
pub mod state;
pub mod store;

pub use engine::{GitFactory, Journey, JourneyOutcome, DEFAULT_REPORTS_DIR};
pub use error::{JourneyError, JourneyResult};
pub use prompt::{BranchAnswers, JourneyPrompt, MergeDecision, ReviewDecision};
pub use session::{JourneySession, SESSION_TTL_DAYS};
pub use state::JourneyState;
pub use store::{SessionStore, DEFAULT_KEEP_BACKUPS};
