//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `PatternLinter`, `RecordingGit`, and `ScriptedPrompt` that
//! satisfy the trait contracts without Vale, git, or a terminal.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::classifier::CONTENT_TYPE_RULE;
use crate::content_type;
use crate::domain::{Result, Severity, Violation};
use crate::fixers;
use crate::git::{ChangeRequest, GitBackend};
use crate::journey::prompt::{BranchAnswers, JourneyPrompt, MergeDecision, ReviewDecision};
use crate::journey::session::JourneySession;
use crate::linter::RuleRunner;
use crate::patch::Document;
use crate::scope::{Scope, SubdirectoryPermissions};

// ---------------------------------------------------------------------------
// PatternLinter
// ---------------------------------------------------------------------------

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(\w+);|\{(\w+)\};").unwrap())
}

/// A linter that finds violations with line patterns.
///
/// Built-in checks cover the deterministic rules, `ContentType`, and
/// `TaskStep`; more rules can be added with [`PatternLinter::with_pattern`].
/// Comment lines are never reported, like Vale.
#[derive(Debug)]
pub struct PatternLinter {
    patterns: HashMap<String, Regex>,
    extra: Vec<Violation>,
    calls: Mutex<Vec<String>>,
}

impl Default for PatternLinter {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternLinter {
    pub fn new() -> Self {
        let mut patterns = HashMap::new();
        for (rule, pattern) in [
            ("LineBreak", r"\s\+\s*$"),
            ("PageBreak", r"^<<<\s*$"),
            ("ThematicBreak", r"^('''|---|\*\*\*)\s*$"),
            ("TaskStep", r"^\.\s+\S"),
        ] {
            patterns.insert(rule.to_string(), Regex::new(pattern).unwrap());
        }
        Self {
            patterns,
            extra: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Report `rule` on every line matching `pattern`.
    pub fn with_pattern(mut self, rule: &str, pattern: &str) -> Self {
        self.patterns
            .insert(rule.to_string(), Regex::new(pattern).unwrap());
        self
    }

    /// Report `violation` on every run of its rule, whatever the file says.
    pub fn with_violation(mut self, violation: Violation) -> Self {
        self.extra.push(violation);
        self
    }

    /// Rules linted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Violations of `rule` in one document.
    pub fn check(&self, file: &Path, doc: &Document, rule: &str) -> Vec<Violation> {
        if rule == CONTENT_TYPE_RULE {
            return check_content_type(file, doc);
        }
        let mut out = Vec::new();
        for (i, line) in doc.lines().iter().enumerate() {
            if line.trim_start().starts_with("//") {
                continue;
            }
            if rule == "EntityReference" {
                out.extend(check_entities(file, i + 1, line));
            } else if let Some(re) = self.patterns.get(rule) {
                if re.is_match(line) {
                    out.push(Violation::new(file, i + 1, rule, format!("{rule} violation"), Severity::Warning));
                }
            }
        }
        out
    }
}

fn check_entities(file: &Path, line_no: usize, line: &str) -> Vec<Violation> {
    entity_regex()
        .captures_iter(line)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let flagged = match (caps.get(1), caps.get(2)) {
                (Some(name), _) => !fixers::is_xml_entity(name.as_str()),
                (None, Some(name)) => fixers::has_attribute_form(name.as_str()),
                _ => false,
            };
            if !flagged {
                return None;
            }
            let start = line[..whole.start()].chars().count() + 1;
            let end = start + whole.as_str().chars().count() - 1;
            Some(
                Violation::new(
                    file,
                    line_no,
                    "EntityReference",
                    "HTML character entity references are not supported in DITA.",
                    Severity::Warning,
                )
                .with_span(start, end)
                .with_match(whole.as_str()),
            )
        })
        .collect()
}

fn check_content_type(file: &Path, doc: &Document) -> Vec<Violation> {
    if content_type::has_resolved_type(doc.lines()) {
        return Vec::new();
    }
    let line = content_type::detect(doc.lines())
        .map(|a| a.source_line_index + 1)
        .unwrap_or(1);
    vec![Violation::new(
        file,
        line,
        CONTENT_TYPE_RULE,
        "The '_mod-docs-content-type' attribute definition is missing or invalid.",
        Severity::Warning,
    )]
}

#[async_trait]
impl RuleRunner for PatternLinter {
    async fn run_rule(&self, scope: &Scope, rule: &str) -> Result<Vec<Violation>> {
        self.calls.lock().unwrap().push(rule.to_string());
        let mut out = Vec::new();
        for file in scope.files() {
            let doc = Document::read(&scope.resolve(file))?;
            out.extend(self.check(file, &doc, rule));
        }
        out.extend(
            self.extra
                .iter()
                .filter(|v| v.rule == rule && scope.contains(&v.file_path))
                .cloned(),
        );
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// RecordingGit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Checkout(String),
    CreateBranch { name: String, from: String },
    Commit { message: String, paths: Vec<PathBuf> },
    Push(String),
    ChangeRequest(ChangeRequest),
}

/// Git backend that records every call and keeps only the branch name.
#[derive(Debug)]
pub struct RecordingGit {
    branch: Mutex<String>,
    calls: Mutex<Vec<GitCall>>,
}

impl RecordingGit {
    pub fn new(initial_branch: &str) -> Self {
        Self {
            branch: Mutex::new(initial_branch.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Messages of the commits made, in order.
    pub fn commit_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GitCall::Commit { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn change_requests(&self) -> Vec<ChangeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GitCall::ChangeRequest(cr) => Some(cr),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GitCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitBackend for RecordingGit {
    async fn current_branch(&self) -> Result<String> {
        Ok(self.branch.lock().unwrap().clone())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.record(GitCall::Checkout(branch.to_string()));
        *self.branch.lock().unwrap() = branch.to_string();
        Ok(())
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        self.record(GitCall::CreateBranch {
            name: name.to_string(),
            from: from.to_string(),
        });
        *self.branch.lock().unwrap() = name.to_string();
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<Option<String>> {
        self.record(GitCall::Commit {
            message: message.to_string(),
            paths: paths.to_vec(),
        });
        if paths.is_empty() {
            return Ok(None);
        }
        let n = self.commit_messages().len();
        Ok(Some(format!("{n:040x}")))
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.record(GitCall::Push(branch.to_string()));
        Ok(())
    }

    async fn open_change_request(&self, request: &ChangeRequest) -> Result<String> {
        self.record(GitCall::ChangeRequest(request.clone()));
        Ok(format!("https://example.test/pulls/{}", request.head))
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompt
// ---------------------------------------------------------------------------

/// Prompt with canned answers. Review and merge answers are consumed in
/// order; once exhausted, every further question gets the fallback answer,
/// `Stop` unless set with [`ScriptedPrompt::otherwise`].
#[derive(Debug)]
pub struct ScriptedPrompt {
    root: PathBuf,
    branches: BranchAnswers,
    permissions: SubdirectoryPermissions,
    reviews: Mutex<VecDeque<ReviewDecision>>,
    merges: Mutex<VecDeque<MergeDecision>>,
    fallback: (ReviewDecision, MergeDecision),
    reconfirm: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            branches: BranchAnswers {
                default_branch: "main".to_string(),
                release_branches: Vec::new(),
                feature_branch: "ditafix/remediation".to_string(),
            },
            permissions: SubdirectoryPermissions::default(),
            reviews: Mutex::new(VecDeque::new()),
            merges: Mutex::new(VecDeque::new()),
            fallback: (ReviewDecision::Stop, MergeDecision::Stop),
            reconfirm: false,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn with_permissions(mut self, permissions: SubdirectoryPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_reviews(self, answers: impl IntoIterator<Item = ReviewDecision>) -> Self {
        self.reviews.lock().unwrap().extend(answers);
        self
    }

    pub fn with_merges(self, answers: impl IntoIterator<Item = MergeDecision>) -> Self {
        self.merges.lock().unwrap().extend(answers);
        self
    }

    pub fn with_branches(mut self, branches: BranchAnswers) -> Self {
        self.branches = branches;
        self
    }

    /// Answers given once the scripted reviews and merges run out.
    pub fn otherwise(mut self, review: ReviewDecision, merge: MergeDecision) -> Self {
        self.fallback = (review, merge);
        self
    }

    pub fn with_reconfirm(mut self, answer: bool) -> Self {
        self.reconfirm = answer;
        self
    }

    /// Questions asked so far, e.g. `review:ContentType`.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn ask(&self, question: String) {
        self.asked.lock().unwrap().push(question);
    }
}

impl JourneyPrompt for ScriptedPrompt {
    fn repo_root(&self, _suggested: Option<&PathBuf>) -> std::io::Result<PathBuf> {
        self.ask("repo_root".to_string());
        Ok(self.root.clone())
    }

    fn branches(&self, _current_branch: &str) -> std::io::Result<BranchAnswers> {
        self.ask("branches".to_string());
        Ok(self.branches.clone())
    }

    fn permissions(&self) -> std::io::Result<SubdirectoryPermissions> {
        self.ask("permissions".to_string());
        Ok(self.permissions.clone())
    }

    fn review_complete(&self, rule: &str, _change_request: &str) -> std::io::Result<ReviewDecision> {
        self.ask(format!("review:{rule}"));
        Ok(self
            .reviews
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback.0))
    }

    fn merge_decision(&self, rule: &str) -> std::io::Result<MergeDecision> {
        self.ask(format!("merge:{rule}"));
        Ok(self
            .merges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback.1))
    }

    fn reconfirm(&self, _session: &JourneySession) -> std::io::Result<bool> {
        self.ask("reconfirm".to_string());
        Ok(self.reconfirm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_check_reports_spans() {
        let linter = PatternLinter::new();
        let doc = Document::from_lines(["a &mdash; b &amp; c {ndash}; d", "// &mdash; in a comment"]);
        let vs = linter.check(Path::new("a.adoc"), &doc, "EntityReference");
        assert_eq!(vs.len(), 2);
        assert_eq!(vs[0].span, Some((3, 9)));
        assert_eq!(vs[1].matched.as_deref(), Some("{ndash};"));
    }

    #[test]
    fn test_content_type_check() {
        let linter = PatternLinter::new();
        let ok = Document::from_lines([":_mod-docs-content-type: CONCEPT", "", "= A"]);
        assert!(linter.check(Path::new("a.adoc"), &ok, CONTENT_TYPE_RULE).is_empty());
        let tbd = Document::from_lines(["// flag", ":_mod-docs-content-type: TBD"]);
        let vs = linter.check(Path::new("a.adoc"), &tbd, CONTENT_TYPE_RULE);
        assert_eq!(vs[0].line, 2);
    }

    #[tokio::test]
    async fn test_recording_git() {
        let git = RecordingGit::new("main");
        git.create_branch("feature", "main").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "feature");
        assert!(git.commit("empty", &[]).await.unwrap().is_none());
        assert!(git
            .commit("one", &[PathBuf::from("a.adoc")])
            .await
            .unwrap()
            .is_some());
        assert_eq!(git.commit_messages(), vec!["empty".to_string(), "one".to_string()]);
    }

    #[test]
    fn test_scripted_prompt_defaults_to_stop() {
        let prompt = ScriptedPrompt::new("/repo").with_merges([MergeDecision::Merged]);
        assert_eq!(prompt.merge_decision("X").unwrap(), MergeDecision::Merged);
        assert_eq!(prompt.merge_decision("X").unwrap(), MergeDecision::Stop);
        assert_eq!(prompt.review_complete("X", "").unwrap(), ReviewDecision::Stop);
        assert_eq!(prompt.asked().len(), 3);

        let approving = ScriptedPrompt::new("/repo")
            .with_reviews([ReviewDecision::Stop])
            .otherwise(ReviewDecision::Continue, MergeDecision::Merged);
        assert_eq!(approving.review_complete("X", "").unwrap(), ReviewDecision::Stop);
        assert_eq!(approving.review_complete("X", "").unwrap(), ReviewDecision::Continue);
        assert_eq!(approving.merge_decision("X").unwrap(), MergeDecision::Merged);
    }

    #[tokio::test]
    async fn test_injected_violation_reported_for_its_rule_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.adoc"), "= A\n").unwrap();
        let scope = Scope::discover(dir.path(), &Default::default()).unwrap();
        let linter = PatternLinter::new().with_violation(Violation::new(
            "a.adoc",
            9,
            "PageBreak",
            "stale",
            Severity::Warning,
        ));
        assert_eq!(linter.run_rule(&scope, "PageBreak").await.unwrap().len(), 1);
        assert!(linter.run_rule(&scope, "LineBreak").await.unwrap().is_empty());
    }
}
