//! ditafix core library
//!
//! Remediates AsciiDocDITA linter violations in AsciiDoc sources ahead of a
//! DITA migration, one rule at a time, and drives the resumable journey
//! that walks a repository through every remediation stage.

pub mod annotator;
pub mod classifier;
pub mod config;
pub mod content_type;
pub mod domain;
pub mod fakes;
pub mod fixers;
pub mod git;
pub mod journey;
pub mod linter;
pub mod pass;
pub mod patch;
pub mod report;
pub mod scope;
pub mod telemetry;
pub mod violation_index;

pub use annotator::{CommentAnnotator, DEFAULT_RESOURCE_BASE_URL};
pub use classifier::{RuleRegistry, CONTENT_TYPE_RULE};
pub use config::{detect_repo_root, ConfigOverrides, RemedyConfig, CONFIG_FILE};
pub use content_type::{ContentType, ContentTypeResolver, Resolution, ResolutionSource};
pub use domain::{
    FixRule, FixTier, ParseError, RemedyError, Result, Severity, StageDefinition, Violation,
};
pub use git::{ChangeRequest, GitBackend, GitCli};
pub use journey::{
    GitFactory, Journey, JourneyError, JourneyOutcome, JourneyPrompt, JourneyResult,
    JourneySession, JourneyState, SessionStore,
};
pub use linter::{RuleRunner, ValeConfig, ValeRunner};
pub use pass::{PassOutcome, RulePass};
pub use patch::{Document, LineEnding, PatchEngine, PatchOperation, PatchSummary};
pub use report::{render_stage_summary_md, ReportReason, ReportRecord, ReportWriter};
pub use scope::{Scope, SubdirectoryPermissions};
pub use violation_index::ViolationIndex;

/// Crate version, reported by `ditafix --version` and in change requests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
