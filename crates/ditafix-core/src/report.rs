//! Per-rule report artifacts and change-request summaries.
//!
//! Every violation a pass hands to a human is appended as one JSON line to
//! `<reports dir>/<Rule>.jsonl`. Files are append-only; earlier records
//! are never rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{FixRule, FixTier, RemedyError, Result};
use crate::pass::PassOutcome;

/// Why a violation was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    /// A deterministic fix did not clear the violation.
    Escalated,
    /// The violation was annotated for review.
    Flagged,
    /// The file was skipped because a prerequisite rule is incomplete.
    SkippedPrerequisite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub timestamp: DateTime<Utc>,
    pub rule: String,
    pub file: PathBuf,
    pub line: usize,
    pub tier: FixTier,
    pub reason: ReportReason,
    pub message: String,
}

impl ReportRecord {
    pub fn new(
        rule: &FixRule,
        file: impl Into<PathBuf>,
        line: usize,
        reason: ReportReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            rule: rule.name.clone(),
            file: file.into(),
            line,
            tier: rule.tier,
            reason,
            message: message.into(),
        }
    }
}

/// Appends report records under one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, rule_name: &str) -> PathBuf {
        self.dir.join(format!("{rule_name}.jsonl"))
    }

    /// Append records, one JSON object per line, to each rule's file.
    pub fn append(&self, records: &[ReportRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        fs::create_dir_all(&self.dir)?;
        for record in records {
            let path = self.path_for(&record.rule);
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut line = serde_json::to_string(record)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }
        debug!(dir = %self.dir.display(), count = records.len(), "appended report records");
        Ok(records.len())
    }

    /// All records written for `rule_name`, oldest first.
    pub fn read(&self, rule_name: &str) -> Result<Vec<ReportRecord>> {
        let path = self.path_for(rule_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<ReportRecord>(l).map_err(RemedyError::from))
            .collect()
    }
}

/// Render the change-request body for a stage.
pub fn render_stage_summary_md(stage: &str, outcomes: &[PassOutcome]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# ditafix: {stage}\n\n"));
    out.push_str("Rules processed in this stage:\n\n");
    out.push_str("| Rule | Tier | Files changed | Fixed | Flagged | Escalated | Skipped |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for o in outcomes {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            o.rule,
            o.tier.as_str(),
            o.files_changed.len(),
            o.fixed,
            o.flagged,
            o.escalated,
            o.skipped.len()
        ));
    }

    let review: Vec<&PassOutcome> = outcomes
        .iter()
        .filter(|o| o.flagged + o.escalated > 0)
        .collect();
    if !review.is_empty() {
        out.push_str("\n## Needs review\n\n");
        out.push_str("Search for `// Rule:` comments in the changed files.\n\n");
        for o in review {
            out.push_str(&format!(
                "- `{}`: {} flagged, {} escalated\n",
                o.rule, o.flagged, o.escalated
            ));
        }
    }

    let conflicts: Vec<&String> = outcomes.iter().flat_map(|o| o.conflicts.iter()).collect();
    if !conflicts.is_empty() {
        out.push_str("\n## Not modified\n\n");
        for c in conflicts {
            out.push_str(&format!("- {c}\n"));
        }
    }
    out
}
