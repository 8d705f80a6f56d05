//! Domain models for ditafix.
//!
//! - `Violation`: one linter finding against a pre-edit line
//! - `FixRule` / `StageDefinition`: static remediation configuration
//! - `RemedyError`: engine error taxonomy

pub mod error;
pub mod rule;
pub mod violation;

pub use error::{ParseError, RemedyError, Result};
pub use rule::{FixRule, FixTier, StageDefinition};
pub use violation::{Severity, Violation};
