//! The journey driver.
//!
//! `Journey::run` loads (or creates) the session and steps the state
//! machine until it completes or the user stops. Within a rule the order of
//! effects is fixed: the pass writes its files and reruns the linter, the
//! cursor and a pending-publish marker are persisted, the result is
//! committed, and then the session is updated and persisted again.
//! An interruption anywhere before the last save is recovered by re-linting
//! on the next run, which finds nothing left to fix; the marker still makes
//! that run push, open the change request, and pause for review.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::error::{JourneyError, JourneyResult};
use super::prompt::{JourneyPrompt, MergeDecision, ReviewDecision};
use super::session::JourneySession;
use super::state::JourneyState;
use super::store::SessionStore;
use crate::annotator::CommentAnnotator;
use crate::classifier::RuleRegistry;
use crate::domain::FixTier;
use crate::git::{ChangeRequest, GitBackend};
use crate::linter::RuleRunner;
use crate::pass::RulePass;
use crate::report::{render_stage_summary_md, ReportWriter};
use crate::scope::Scope;

/// Builds the git backend once the repository root is known.
pub type GitFactory = Arc<dyn Fn(&Path) -> Arc<dyn GitBackend> + Send + Sync>;

/// Default report directory, relative to the repository root.
pub const DEFAULT_REPORTS_DIR: &str = ".ditafix/reports";

/// How a `run` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JourneyOutcome {
    /// The user stopped; the session is saved in `state`.
    Paused { state: JourneyState },
    Completed,
}

pub struct Journey {
    registry: Arc<RuleRegistry>,
    linter: Arc<dyn RuleRunner>,
    git_factory: GitFactory,
    prompt: Arc<dyn JourneyPrompt>,
    store: SessionStore,
    annotator: CommentAnnotator,
    reports_dir: PathBuf,
    suggested_root: Option<PathBuf>,
}

impl Journey {
    pub fn new(
        store: SessionStore,
        linter: Arc<dyn RuleRunner>,
        git_factory: GitFactory,
        prompt: Arc<dyn JourneyPrompt>,
    ) -> Self {
        Self {
            registry: Arc::new(RuleRegistry::builtin()),
            linter,
            git_factory,
            prompt,
            store,
            annotator: CommentAnnotator::default(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
            suggested_root: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_annotator(mut self, annotator: CommentAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Report directory; relative paths are taken from the repo root.
    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    /// Root offered as the default answer when configuring.
    pub fn with_suggested_root(mut self, root: Option<PathBuf>) -> Self {
        self.suggested_root = root;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start or resume the journey.
    ///
    /// # Errors
    ///
    /// Fails with `SessionCorrupt` if the saved record cannot be trusted,
    /// `SessionExpired` if the window passed and the user declined to
    /// re-confirm, and with any remediation or git error that halts a stage.
    pub async fn run(&self) -> JourneyResult<JourneyOutcome> {
        let now = Utc::now();
        let mut session = match self.store.load()? {
            Some(s) => {
                info!(session = %s.session_id, state = %s.state, "resuming journey");
                s
            }
            None => {
                let s = JourneySession::new(now);
                info!(session = %s.session_id, "starting journey");
                self.store.save(&s)?;
                s
            }
        };

        if let Err(expired) = session.ensure_active(now) {
            if !(session.state.is_configured() && self.prompt.reconfirm(&session)?) {
                return Err(expired);
            }
            session.renew(now);
            self.store.save(&session)?;
        }

        let mut on_feature_branch = false;
        loop {
            let state = session.state.clone();
            if state.is_configured() && !state.is_terminal() && !on_feature_branch {
                self.enter_feature_branch(&mut session).await?;
                on_feature_branch = true;
            }
            match state {
                JourneyState::Unconfigured
                | JourneyState::ConfiguringRepo
                | JourneyState::ConfiguringBranches
                | JourneyState::ConfiguringPermissions => self.configure_step(&mut session).await?,
                JourneyState::Ready => {
                    session.current_stage = 0;
                    self.advance(&mut session, JourneyState::RunningStage { stage: 0 })?;
                }
                JourneyState::RunningStage { stage } => self.run_stage_step(&mut session, stage).await?,
                JourneyState::AwaitingUserReview { rule } => {
                    let cr = session.change_request.clone().unwrap_or_default();
                    match self.prompt.review_complete(&rule, &cr)? {
                        ReviewDecision::Stop => return self.pause(&mut session, "stopped at review"),
                        ReviewDecision::Continue => self.advance(
                            &mut session,
                            JourneyState::AwaitingMergeConfirmation { rule },
                        )?,
                    }
                }
                JourneyState::AwaitingMergeConfirmation { rule } => {
                    match self.prompt.merge_decision(&rule)? {
                        MergeDecision::Stop => {
                            return self.pause(&mut session, "stopped before merge confirmation")
                        }
                        MergeDecision::Reprocess => {
                            session.completed_rules.retain(|r| r != &rule);
                            session.stage_outcomes.retain(|o| o.rule != rule);
                            session.note(Utc::now(), format!("reprocessing {rule}"));
                            let stage = session.current_stage;
                            self.advance(&mut session, JourneyState::RunningStage { stage })?;
                        }
                        MergeDecision::Merged => {
                            session.note(Utc::now(), format!("{rule} merged"));
                            let stage = session.current_stage;
                            let next = if self.next_rule(&session, stage).is_some() {
                                JourneyState::RunningStage { stage }
                            } else {
                                JourneyState::StageComplete { stage }
                            };
                            self.advance(&mut session, next)?;
                        }
                    }
                }
                JourneyState::StageComplete { stage } => {
                    if stage + 1 < self.registry.stages().len() {
                        session.current_stage = stage + 1;
                        session.current_rule = None;
                        session.stage_outcomes.clear();
                        session.change_request = None;
                        self.advance(&mut session, JourneyState::RunningStage { stage: stage + 1 })?;
                    } else {
                        session.current_rule = None;
                        self.advance(&mut session, JourneyState::AllStagesComplete)?;
                    }
                }
                JourneyState::AllStagesComplete => {
                    info!(session = %session.session_id, "all stages complete");
                    return Ok(JourneyOutcome::Completed);
                }
            }
        }
    }

    fn advance(&self, session: &mut JourneySession, next: JourneyState) -> JourneyResult<()> {
        let from = session.state.clone();
        session.transition(next, Utc::now())?;
        info!(from = %from, to = %session.state, "journey transition");
        self.store.save(session)
    }

    fn pause(&self, session: &mut JourneySession, why: &str) -> JourneyResult<JourneyOutcome> {
        session.note(Utc::now(), why);
        self.store.save(session)?;
        info!(state = %session.state, "journey paused");
        Ok(JourneyOutcome::Paused {
            state: session.state.clone(),
        })
    }

    fn git(&self, session: &JourneySession) -> JourneyResult<Arc<dyn GitBackend>> {
        Ok((self.git_factory)(session.repo_root()?))
    }

    async fn enter_feature_branch(&self, session: &mut JourneySession) -> JourneyResult<()> {
        let (Some(feature), Some(base)) = (session.feature_branch.clone(), session.default_branch.clone())
        else {
            return Err(JourneyError::NotConfigured);
        };
        ensure_unprotected(session, &feature)?;
        let git = self.git(session)?;
        if git.current_branch().await? != feature {
            git.create_branch(&feature, &base).await?;
        }
        Ok(())
    }

    async fn configure_step(&self, session: &mut JourneySession) -> JourneyResult<()> {
        match session.state {
            JourneyState::Unconfigured => {
                self.advance(session, JourneyState::ConfiguringRepo)?;
            }
            JourneyState::ConfiguringRepo => {
                let root = self.prompt.repo_root(self.suggested_root.as_ref())?;
                session.repo_root = Some(root);
                self.advance(session, JourneyState::ConfiguringBranches)?;
            }
            JourneyState::ConfiguringBranches => {
                let current = self.git(session)?.current_branch().await?;
                let answers = self.prompt.branches(&current)?;
                session.default_branch = Some(answers.default_branch);
                session.release_branches = answers.release_branches;
                ensure_unprotected(session, &answers.feature_branch)?;
                session.feature_branch = Some(answers.feature_branch);
                self.advance(session, JourneyState::ConfiguringPermissions)?;
            }
            JourneyState::ConfiguringPermissions => {
                session.subdirectory_permissions = self.prompt.permissions()?;
                self.advance(session, JourneyState::Ready)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn next_rule(&self, session: &JourneySession, stage: usize) -> Option<String> {
        self.registry
            .stage(stage)?
            .rules
            .iter()
            .find(|r| !session.is_rule_complete(r))
            .cloned()
    }

    /// Run the next rule of `stage`, or finish the stage.
    async fn run_stage_step(&self, session: &mut JourneySession, stage: usize) -> JourneyResult<()> {
        let Some(def) = self.registry.stage(stage).cloned() else {
            warn!(stage, "no such stage, finishing");
            return self.advance(session, JourneyState::StageComplete { stage });
        };
        session.current_stage = stage;

        let Some(rule_name) = self.next_rule(session, stage) else {
            let deterministic = def.rules.iter().all(|r| {
                self.registry
                    .classify(r)
                    .map(|rule| rule.tier == FixTier::Deterministic)
                    .unwrap_or(false)
            });
            if deterministic && session.pending_publish {
                self.publish(session, &def.name).await?;
            }
            return self.advance(session, JourneyState::StageComplete { stage });
        };

        let rule = self.registry.classify(&rule_name)?.clone();
        session.current_rule = Some(rule.name.clone());
        let root = session.repo_root()?.clone();
        let scope = Scope::discover(&root, &session.subdirectory_permissions)?;

        let reports_dir = if self.reports_dir.is_absolute() {
            self.reports_dir.clone()
        } else {
            root.join(&self.reports_dir)
        };
        let pass = RulePass::new(self.registry.clone(), self.linter.clone(), ReportWriter::new(reports_dir))
            .with_annotator(self.annotator.clone());
        let outcome = pass.run(&rule.name, &scope).await?;

        if outcome.changed_anything() {
            session.record_commit(&rule.name, &outcome.files_changed, Utc::now());
            session.pending_publish = true;
            self.store.save(session)?;

            let message = format!(
                "ditafix: {} ({})\n\nfixed {}, flagged {}, escalated {}",
                rule.name,
                rule.tier.as_str(),
                outcome.fixed,
                outcome.flagged,
                outcome.escalated
            );
            let git = self.git(session)?;
            match git.commit(&message, &outcome.files_changed).await? {
                Some(sha) => info!(rule = %rule.name, sha = %sha, "committed pass"),
                None => warn!(rule = %rule.name, "pass changed files but nothing was staged"),
            }
        }
        session.mark_rule_complete(&outcome);

        if rule.tier.requires_review() {
            if session.pending_publish {
                self.publish(session, &def.name).await?;
            }
            self.advance(session, JourneyState::AwaitingUserReview { rule: rule.name })
        } else {
            self.advance(session, JourneyState::RunningStage { stage })
        }
    }

    /// Push the feature branch and open or update its change request.
    async fn publish(&self, session: &mut JourneySession, stage_name: &str) -> JourneyResult<()> {
        let (Some(feature), Some(base)) = (session.feature_branch.clone(), session.default_branch.clone())
        else {
            return Err(JourneyError::NotConfigured);
        };
        let git = self.git(session)?;
        git.push(&feature).await?;
        let request = ChangeRequest {
            head: feature,
            base,
            title: format!("ditafix: {stage_name} stage"),
            body: render_stage_summary_md(stage_name, &session.stage_outcomes),
        };
        let cr = git.open_change_request(&request).await?;
        let rules: Vec<&str> = session.stage_outcomes.iter().map(|o| o.rule.as_str()).collect();
        session.note(Utc::now(), format!("change request {cr} covers {}", rules.join(", ")));
        session.change_request = Some(cr);
        session.pending_publish = false;
        Ok(())
    }
}

fn ensure_unprotected(session: &JourneySession, feature: &str) -> JourneyResult<()> {
    if session.is_protected_branch(feature) {
        return Err(JourneyError::ProtectedBranch {
            branch: feature.to_string(),
        });
    }
    Ok(())
}
