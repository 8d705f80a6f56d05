//! ditafix - AsciiDoc remediation ahead of a DITA migration
//!
//! ## Commands
//!
//! - `journey`: start or resume the guided, stage-by-stage remediation
//! - `fix`: run a single rule pass without the journey
//! - `rules`: list the rule registry and its stages
//! - `session`: show or reset the saved journey session

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use tracing::info;

use ditafix_core::journey::{
    BranchAnswers, JourneyPrompt, JourneySession, MergeDecision, ReviewDecision,
};
use ditafix_core::telemetry::{init_tracing, level_for_verbosity, LogFormat};
use ditafix_core::{
    detect_repo_root, ConfigOverrides, GitBackend, GitCli, GitFactory, Journey, JourneyError,
    JourneyOutcome, RemedyConfig, ReportWriter, RuleRegistry, RulePass, Scope, SessionStore,
    SubdirectoryPermissions, ValeRunner,
};

const DEFAULT_FEATURE_BRANCH: &str = "ditafix/remediation";

#[derive(Parser, Debug)]
#[command(name = "ditafix")]
#[command(version = ditafix_core::VERSION)]
#[command(about = "Remediate AsciiDocDITA violations ahead of a DITA migration", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "DITAFIX_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that touches a repository.
#[derive(Args, Debug, Clone, Default)]
struct ConfigArgs {
    /// Repository root (default: detected from the current directory)
    #[arg(long, env = "DITAFIX_REPO_ROOT")]
    repo_root: Option<PathBuf>,

    /// Session file (default: <config dir>/ditafix/journey.json)
    #[arg(long, env = "DITAFIX_SESSION")]
    session_file: Option<PathBuf>,

    /// Directory for per-rule report files
    #[arg(long, env = "DITAFIX_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Linter command, whitespace separated
    #[arg(long, env = "DITAFIX_LINTER")]
    linter: Option<String>,

    /// Linter timeout in seconds; 0 disables it
    #[arg(long, env = "DITAFIX_LINTER_TIMEOUT")]
    linter_timeout: Option<u64>,

    /// Base URL for rule links in flag comments
    #[arg(long, env = "DITAFIX_RESOURCE_BASE_URL")]
    resource_base_url: Option<String>,
}

impl ConfigArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            linter_command: self
                .linter
                .as_deref()
                .map(|c| c.split_whitespace().map(str::to_string).collect()),
            linter_timeout_secs: self.linter_timeout,
            resource_base_url: self.resource_base_url.clone(),
            reports_dir: self.reports_dir.clone(),
            session_path: self.session_file.clone(),
        }
    }

    /// Repository root and its effective configuration.
    fn resolve(&self) -> Result<(PathBuf, RemedyConfig)> {
        let start = match &self.repo_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let root = detect_repo_root(&start);
        let config = RemedyConfig::load(&root)
            .with_context(|| format!("Failed to load configuration from {}", root.display()))?
            .apply(self.overrides());
        Ok((root, config))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start or resume the guided remediation journey
    Journey {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Run one rule pass over the repository, or over the given files
    Fix {
        /// Rule name, e.g. EntityReference
        #[arg(short, long)]
        rule: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,

        /// Files to process (default: every .adoc file in scope)
        paths: Vec<PathBuf>,
    },

    /// List every known rule by stage
    Rules {
        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or discard the saved journey session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Print the saved session
    Show {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Delete the saved session (a backup is kept)
    Reset {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Journey { config } => cmd_journey(&config).await,
        Commands::Fix {
            rule,
            json,
            config,
            paths,
        } => cmd_fix(&config, &rule, &paths, json).await,
        Commands::Rules { json } => cmd_rules(json),
        Commands::Session { action } => match action {
            SessionAction::Show { config } => cmd_session_show(&config),
            SessionAction::Reset { config } => cmd_session_reset(&config),
        },
    }
}

/// Start or resume the journey
async fn cmd_journey(args: &ConfigArgs) -> Result<()> {
    let (root, config) = args.resolve()?;
    let store = SessionStore::new(config.session_path()?);
    info!(session = %store.path().display(), root = %root.display(), "opening journey");

    let factory: GitFactory =
        Arc::new(|root: &Path| Arc::new(GitCli::new(root)) as Arc<dyn GitBackend>);
    let journey = Journey::new(
        store,
        Arc::new(ValeRunner::new(config.linter.clone())),
        factory,
        Arc::new(TerminalPrompt),
    )
    .with_annotator(config.annotator())
    .with_reports_dir(config.reports.dir.clone())
    .with_suggested_root(Some(root));

    match journey.run().await {
        Ok(JourneyOutcome::Completed) => {
            println!("All stages complete. The repository is ready for DITA conversion.");
            Ok(())
        }
        Ok(JourneyOutcome::Paused { state }) => {
            println!("Paused at {state}. Run `ditafix journey` to resume.");
            Ok(())
        }
        Err(JourneyError::SessionExpired { expired_at }) => bail!(
            "Session expired on {}. Run `ditafix session reset` to start over.",
            expired_at.format("%Y-%m-%d %H:%M UTC")
        ),
        Err(e @ JourneyError::SessionCorrupt { .. }) => {
            Err(e).context("Refusing to resume from an untrusted session")
        }
        Err(e) => Err(e).context("Journey halted"),
    }
}

/// Run one rule pass outside the journey
async fn cmd_fix(args: &ConfigArgs, rule: &str, paths: &[PathBuf], json: bool) -> Result<()> {
    let (root, config) = args.resolve()?;
    let registry = Arc::new(RuleRegistry::builtin());
    registry.classify(rule)?;

    let scope = if paths.is_empty() {
        Scope::discover(&root, &SubdirectoryPermissions::default())?
    } else {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let files = paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { cwd.join(p) })
            .collect();
        Scope::from_files(&root, files)
    };
    if scope.is_empty() {
        println!("No AsciiDoc files in scope under {}", root.display());
        return Ok(());
    }

    let pass = RulePass::new(
        registry,
        Arc::new(ValeRunner::new(config.linter.clone())),
        ReportWriter::new(config.reports_dir(&root)),
    )
    .with_annotator(config.annotator());
    let outcome = pass
        .run(rule, &scope)
        .await
        .with_context(|| format!("{rule} pass failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    println!(
        "{} ({}): {} file(s) changed, {} fixed, {} flagged, {} escalated",
        outcome.rule,
        outcome.tier.as_str(),
        outcome.files_changed.len(),
        outcome.fixed,
        outcome.flagged,
        outcome.escalated
    );
    for file in &outcome.files_changed {
        println!("  M {}", file.display());
    }
    for file in &outcome.skipped {
        println!("  - {} (content type unresolved)", file.display());
    }
    for conflict in &outcome.conflicts {
        println!("  ! {conflict}");
    }
    if outcome.flagged + outcome.escalated > 0 {
        println!("Review the `// Rule: {rule}` comments before committing.");
    }
    Ok(())
}

/// List the registry
fn cmd_rules(json: bool) -> Result<()> {
    let registry = RuleRegistry::builtin();
    if json {
        let rules: Vec<_> = registry.ordered_rules().collect();
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }
    for (i, stage) in registry.stages().iter().enumerate() {
        println!("Stage {}: {}", i + 1, stage.name);
        for name in &stage.rules {
            let rule = registry.classify(name)?;
            match &rule.dependency {
                Some(dep) => println!("  {:<20} {:<18} requires {dep}", rule.name, rule.tier.as_str()),
                None => println!("  {:<20} {}", rule.name, rule.tier.as_str()),
            }
        }
    }
    Ok(())
}

fn session_store(args: &ConfigArgs) -> Result<SessionStore> {
    let (_, config) = args.resolve()?;
    Ok(SessionStore::new(config.session_path()?))
}

/// Print the saved session
fn cmd_session_show(args: &ConfigArgs) -> Result<()> {
    let store = session_store(args)?;
    let Some(session) = store
        .load()
        .with_context(|| format!("Failed to read session {}", store.path().display()))?
    else {
        println!("No saved session at {}", store.path().display());
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

/// Delete the saved session
fn cmd_session_reset(args: &ConfigArgs) -> Result<()> {
    let store = session_store(args)?;
    store.reset().context("Failed to reset session")?;
    println!("Session reset: {}", store.path().display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminal prompts
// ---------------------------------------------------------------------------

struct TerminalPrompt;

fn to_io(e: dialoguer::Error) -> io::Error {
    io::Error::other(e.to_string())
}

/// Split a comma-separated answer, dropping empty items.
fn split_list(answer: &str) -> Vec<String> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn ask(prompt: &str, default: Option<String>, allow_empty: bool) -> io::Result<String> {
    let mut input = Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(allow_empty);
    if let Some(default) = default {
        input = input.default(default);
    }
    input.interact_text().map_err(to_io)
}

impl JourneyPrompt for TerminalPrompt {
    fn repo_root(&self, suggested: Option<&PathBuf>) -> io::Result<PathBuf> {
        let answer = Input::<String>::new()
            .with_prompt("Repository root")
            .default(
                suggested
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string()),
            )
            .validate_with(|input: &String| -> std::result::Result<(), String> {
                if Path::new(input).is_dir() {
                    Ok(())
                } else {
                    Err(format!("{input} is not a directory"))
                }
            })
            .interact_text()
            .map_err(to_io)?;
        Path::new(&answer).canonicalize()
    }

    fn branches(&self, current_branch: &str) -> io::Result<BranchAnswers> {
        let default_branch = ask("Default branch", Some(current_branch.to_string()), false)?;
        let release = ask("Release branches (comma separated)", None, true)?;
        let feature_branch = ask(
            "Feature branch for remediation commits",
            Some(DEFAULT_FEATURE_BRANCH.to_string()),
            false,
        )?;
        Ok(BranchAnswers {
            default_branch,
            release_branches: split_list(&release),
            feature_branch,
        })
    }

    fn permissions(&self) -> io::Result<SubdirectoryPermissions> {
        let allow = ask("Only process these subdirectories (comma separated, empty for all)", None, true)?;
        let block = ask("Never process these subdirectories (comma separated)", None, true)?;
        Ok(SubdirectoryPermissions {
            allow: split_list(&allow).into_iter().map(PathBuf::from).collect(),
            block: split_list(&block).into_iter().map(PathBuf::from).collect(),
        })
    }

    fn review_complete(&self, rule: &str, change_request: &str) -> io::Result<ReviewDecision> {
        println!();
        if change_request.is_empty() {
            println!("{rule} changed nothing; there is nothing new to review.");
        } else {
            println!("{rule} needs review. Resolve the `// Rule: {rule}` comments in:");
            println!("  {change_request}");
        }
        let done = Confirm::new()
            .with_prompt("Have you finished the review?")
            .default(false)
            .interact()
            .map_err(to_io)?;
        Ok(if done {
            ReviewDecision::Continue
        } else {
            ReviewDecision::Stop
        })
    }

    fn merge_decision(&self, rule: &str) -> io::Result<MergeDecision> {
        let items = [
            "Merged, continue".to_string(),
            format!("Run {rule} again"),
            "Stop for now".to_string(),
        ];
        let choice = Select::new()
            .with_prompt(format!("Has the change request for {rule} been merged?"))
            .items(&items)
            .default(0)
            .interact()
            .map_err(to_io)?;
        Ok(match choice {
            0 => MergeDecision::Merged,
            1 => MergeDecision::Reprocess,
            _ => MergeDecision::Stop,
        })
    }

    fn reconfirm(&self, session: &JourneySession) -> io::Result<bool> {
        println!("The saved session expired on {}.", session.expires_at.format("%Y-%m-%d"));
        if let Some(root) = &session.repo_root {
            println!("  repository:     {}", root.display());
        }
        if let Some(branch) = &session.default_branch {
            println!("  default branch: {branch}");
        }
        if let Some(branch) = &session.feature_branch {
            println!("  feature branch: {branch}");
        }
        println!("  state:          {}", session.state);
        Confirm::new()
            .with_prompt("Keep this configuration and continue?")
            .default(true)
            .interact()
            .map_err(to_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fix_with_paths() {
        let cli = Cli::try_parse_from([
            "ditafix",
            "-vv",
            "fix",
            "--rule",
            "EntityReference",
            "--linter",
            "podman run --rm vale",
            "docs/a.adoc",
            "docs/b.adoc",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Fix {
            rule,
            config,
            paths,
            json,
        } = cli.command
        else {
            panic!("expected fix");
        };
        assert_eq!(rule, "EntityReference");
        assert!(!json);
        assert_eq!(paths.len(), 2);
        assert_eq!(
            config.overrides().linter_command,
            Some(vec!["podman".into(), "run".into(), "--rm".into(), "vale".into()])
        );
    }

    #[test]
    fn test_parse_session_reset_with_file() {
        let cli = Cli::try_parse_from([
            "ditafix",
            "session",
            "reset",
            "--session-file",
            "/tmp/j.json",
        ])
        .unwrap();
        let Commands::Session {
            action: SessionAction::Reset { config },
        } = cli.command
        else {
            panic!("expected session reset");
        };
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/j.json")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ditafix", "rules", "--json-logs", "--json"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Rules { json: true }));
    }

    #[test]
    fn test_prompt_errors_become_io_errors() {
        let err = to_io(dialoguer::Error::IO(io::Error::new(
            io::ErrorKind::Interrupted,
            "terminal closed",
        )));
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("terminal closed"));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" release-1, ,release-2 "), vec!["release-1", "release-2"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_resolve_applies_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(
            dir.path().join("ditafix.toml"),
            "[reports]\ndir = \"from-file\"\n[linter]\ntimeout_secs = 5\n",
        )
        .unwrap();
        let args = ConfigArgs {
            repo_root: Some(dir.path().to_path_buf()),
            linter_timeout: Some(60),
            ..Default::default()
        };
        let (root, config) = args.resolve().unwrap();
        assert_eq!(root, dir.path());
        assert_eq!(config.reports_dir(&root), dir.path().join("from-file"));
        assert_eq!(config.linter.timeout_secs, 60);
    }
}
