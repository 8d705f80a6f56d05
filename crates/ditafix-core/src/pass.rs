//! One rule, one pass.
//!
//! A `RulePass` lints the scope once for a single rule, turns the
//! violations into patch operations according to the rule's tier, applies
//! them file by file, and for the Deterministic tier reruns the linter and
//! escalates whatever is left. Errors confined to one file are logged and
//! recorded in the outcome; everything else propagates.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::annotator::CommentAnnotator;
use crate::classifier::{RuleRegistry, CONTENT_TYPE_RULE};
use crate::content_type::{self, ContentTypeResolver, ResolutionSource};
use crate::domain::{FixRule, FixTier, RemedyError, Result, Violation};
use crate::fixers;
use crate::linter::RuleRunner;
use crate::patch::{Document, PatchEngine, PatchKind, PatchOperation};
use crate::report::{ReportReason, ReportRecord, ReportWriter};
use crate::scope::Scope;
use crate::violation_index::ViolationIndex;

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub rule: String,
    pub tier: FixTier,
    /// Files written by this pass, relative to the scope root.
    pub files_changed: Vec<PathBuf>,
    /// Violations addressed by a fix. For the Deterministic tier, the
    /// drop in violations between the first and the verifying run.
    pub fixed: usize,
    /// Lines newly flagged for review.
    pub flagged: usize,
    /// Deterministic violations that survived the fix and were flagged.
    pub escalated: usize,
    /// Files left untouched because their edits conflicted.
    pub conflicts: Vec<String>,
    /// Files skipped because a prerequisite rule is incomplete.
    pub skipped: Vec<PathBuf>,
    /// Violations reported by the last linter run of the pass.
    pub remaining: Vec<Violation>,
}

impl PassOutcome {
    pub fn new(rule: &str, tier: FixTier) -> Self {
        Self {
            rule: rule.to_string(),
            tier,
            files_changed: Vec::new(),
            fixed: 0,
            flagged: 0,
            escalated: 0,
            conflicts: Vec::new(),
            skipped: Vec::new(),
            remaining: Vec::new(),
        }
    }

    pub fn changed_anything(&self) -> bool {
        !self.files_changed.is_empty()
    }
}

/// Edits planned for one file, with the bookkeeping to record if they
/// apply.
#[derive(Default)]
struct FilePlan {
    ops: Vec<PatchOperation>,
    fixed: usize,
    records: Vec<ReportRecord>,
}

/// Runs single-rule passes against a scope.
pub struct RulePass {
    registry: Arc<RuleRegistry>,
    linter: Arc<dyn RuleRunner>,
    annotator: CommentAnnotator,
    resolver: ContentTypeResolver,
    reports: ReportWriter,
}

impl RulePass {
    pub fn new(registry: Arc<RuleRegistry>, linter: Arc<dyn RuleRunner>, reports: ReportWriter) -> Self {
        Self {
            registry,
            linter,
            annotator: CommentAnnotator::default(),
            resolver: ContentTypeResolver::default(),
            reports,
        }
    }

    /// Use `annotator` for flag comments, including the content-type flag.
    pub fn with_annotator(mut self, annotator: CommentAnnotator) -> Self {
        self.resolver = ContentTypeResolver::new(annotator.clone());
        self.annotator = annotator;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn reports(&self) -> &ReportWriter {
        &self.reports
    }

    /// Run one pass of `rule_name` over `scope`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown rule, a linter failure, or an I/O error. Patch
    /// conflicts only exclude the affected file.
    pub async fn run(&self, rule_name: &str, scope: &Scope) -> Result<PassOutcome> {
        let rule = self.registry.classify(rule_name)?.clone();
        let mut outcome = PassOutcome::new(&rule.name, rule.tier);
        info!(rule = %rule.name, tier = rule.tier.as_str(), files = scope.len(), "starting pass");

        let found = self.linter.run_rule(scope, &rule.name).await?;
        let index = ViolationIndex::from_violations(&rule.name, found);
        let mut records = Vec::new();
        let mut conflicted: HashSet<PathBuf> = HashSet::new();
        let prerequisites = self.registry.prerequisites_for(&rule.name);

        for (file, violations) in index.iter() {
            let path = scope.resolve(file);
            let original = Document::read(&path)?;

            if let Some(dep) = prerequisites.iter().find(|dep| !prerequisite_met(dep, &original)) {
                info!(rule = %rule.name, file = %file.display(), dependency = %dep, "skipping file with unresolved prerequisite");
                outcome.skipped.push(file.to_path_buf());
                records.push(ReportRecord::new(
                    &rule,
                    file,
                    violations.first().map(|v| v.line).unwrap_or(1),
                    ReportReason::SkippedPrerequisite,
                    format!("{dep} is unresolved; resolve it before {}", rule.name),
                ));
                continue;
            }

            if let Err(e) = check_lines(file, &original, violations) {
                warn!(rule = %rule.name, file = %file.display(), error = %e, "leaving file unchanged");
                conflicted.insert(file.to_path_buf());
                outcome.conflicts.push(e.to_string());
                continue;
            }

            let plan = self.plan_file(&rule, file, &original, violations);
            if plan.ops.is_empty() {
                continue;
            }
            match self.apply_and_write(file, &path, original, plan.ops) {
                Ok(true) => {
                    outcome.files_changed.push(file.to_path_buf());
                    outcome.fixed += plan.fixed;
                    outcome.flagged += plan
                        .records
                        .iter()
                        .filter(|r| r.reason == ReportReason::Flagged)
                        .count();
                    records.extend(plan.records);
                }
                Ok(false) => {}
                Err(e) if e.is_local() => {
                    warn!(rule = %rule.name, file = %file.display(), error = %e, "leaving file unchanged");
                    conflicted.insert(file.to_path_buf());
                    outcome.conflicts.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        if rule.tier == FixTier::Deterministic {
            let rerun = self.linter.run_rule(scope, &rule.name).await?;
            let rerun = ViolationIndex::from_violations(&rule.name, rerun);
            outcome.fixed = index.len().saturating_sub(rerun.len());
            let held: HashSet<PathBuf> = conflicted
                .iter()
                .chain(outcome.skipped.iter())
                .cloned()
                .collect();
            self.escalate(&rule, scope, &rerun, &held, &mut outcome, &mut records)?;
            outcome.remaining = rerun.into_violations();
        } else {
            outcome.remaining = index.into_violations();
        }

        self.reports.append(&records)?;
        info!(
            rule = %rule.name,
            changed = outcome.files_changed.len(),
            fixed = outcome.fixed,
            flagged = outcome.flagged,
            escalated = outcome.escalated,
            skipped = outcome.skipped.len(),
            conflicts = outcome.conflicts.len(),
            "pass complete"
        );
        Ok(outcome)
    }

    fn plan_file(&self, rule: &FixRule, file: &Path, doc: &Document, violations: &[Violation]) -> FilePlan {
        match rule.tier {
            FixTier::Deterministic => {
                let plan = fixers::plan(&rule.name, doc, violations);
                debug!(file = %file.display(), fixed = plan.fixed, left = plan.untouched.len(), "planned fixes");
                FilePlan {
                    ops: plan.ops,
                    fixed: plan.fixed,
                    records: Vec::new(),
                }
            }
            _ if rule.name == CONTENT_TYPE_RULE => {
                let res = self.resolver.resolve(file, doc, rule);
                let mut plan = FilePlan::default();
                let new_flag = res.ops.iter().any(|op| op.kind == PatchKind::InsertAbove);
                if res.source == ResolutionSource::Placeholder {
                    if new_flag {
                        plan.records.push(ReportRecord::new(
                            rule,
                            file,
                            res.flagged_line.unwrap_or(1),
                            ReportReason::Flagged,
                            "content type could not be determined",
                        ));
                    }
                } else if !res.ops.is_empty() {
                    plan.fixed = 1;
                }
                plan.ops = res.ops;
                plan
            }
            _ => {
                let ops = self.annotator.annotate(rule, doc, violations);
                let flagged: BTreeSet<usize> = ops.iter().map(|op| op.target.start).collect();
                let records = flagged
                    .into_iter()
                    .map(|line| {
                        let message = violations
                            .iter()
                            .find(|v| v.line == line)
                            .map(|v| v.message.clone())
                            .unwrap_or_default();
                        ReportRecord::new(rule, file, line, ReportReason::Flagged, message)
                    })
                    .collect();
                FilePlan {
                    ops,
                    fixed: 0,
                    records,
                }
            }
        }
    }

    /// Apply `ops` and write the file if the buffer changed.
    fn apply_and_write(
        &self,
        file: &Path,
        path: &Path,
        original: Document,
        ops: Vec<PatchOperation>,
    ) -> Result<bool> {
        let mut doc = original.clone();
        let summary = PatchEngine::apply(file, &mut doc, ops)?;
        if doc == original {
            return Ok(false);
        }
        doc.write_atomic(path)?;
        debug!(file = %file.display(), ops = summary.applied, lines = summary.lines_after, "wrote file");
        Ok(true)
    }

    /// Flag deterministic violations that survived the fix. Files in `held`
    /// were left alone by the first run and stay untouched.
    fn escalate(
        &self,
        rule: &FixRule,
        scope: &Scope,
        rerun: &ViolationIndex,
        held: &HashSet<PathBuf>,
        outcome: &mut PassOutcome,
        records: &mut Vec<ReportRecord>,
    ) -> Result<()> {
        for (file, violations) in rerun.iter() {
            if held.contains(file) {
                continue;
            }
            let path = scope.resolve(file);
            let doc = Document::read(&path)?;
            let ops = self.annotator.annotate(rule, &doc, violations);
            if ops.is_empty() {
                continue;
            }
            let lines: BTreeSet<usize> = ops.iter().map(|op| op.target.start).collect();
            match self.apply_and_write(file, &path, doc, ops) {
                Ok(_) => {
                    if !outcome.files_changed.iter().any(|f| f == file) {
                        outcome.files_changed.push(file.to_path_buf());
                    }
                    for v in violations.iter().filter(|v| lines.contains(&v.line)) {
                        let err = RemedyError::UnresolvedDeterministicViolation {
                            file: file.to_path_buf(),
                            line: v.line,
                            rule: rule.name.clone(),
                        };
                        error!(error = %err, "escalating");
                        outcome.escalated += 1;
                        records.push(ReportRecord::new(
                            rule,
                            file,
                            v.line,
                            ReportReason::Escalated,
                            v.message.clone(),
                        ));
                    }
                }
                Err(e) if e.is_local() => {
                    warn!(rule = %rule.name, file = %file.display(), error = %e, "could not flag remaining violations");
                    outcome.conflicts.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Reject linter output that points past the end of the file on disk.
fn check_lines(file: &Path, doc: &Document, violations: &[Violation]) -> Result<()> {
    let last = doc.len().max(1);
    match violations.iter().find(|v| v.line > last) {
        Some(v) => Err(RemedyError::PatchConflict {
            file: file.to_path_buf(),
            detail: format!(
                "{} reported at line {} but the file has {} lines",
                v.rule,
                v.line,
                doc.len()
            ),
        }),
        None => Ok(()),
    }
}

/// Whether `doc` satisfies the prerequisite rule `dependency`.
pub fn prerequisite_met(dependency: &str, doc: &Document) -> bool {
    match dependency {
        CONTENT_TYPE_RULE => content_type::has_resolved_type(doc.lines()),
        _ => true,
    }
}
