//! Linter collaborator.
//!
//! Defines the `RuleRunner` async trait the rule pass calls, plus a
//! `ValeRunner` that shells out to Vale (directly or through a container
//! wrapper) and normalizes its JSON output.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{RemedyError, Result, Violation};
use crate::scope::Scope;
use crate::violation_index::ViolationIndex;

/// Runs one rule over a scope and reports its violations.
#[async_trait]
pub trait RuleRunner: Send + Sync {
    /// Violations of `rule` in `scope`, with paths relative to the scope
    /// root and lines against the files as they are on disk now.
    async fn run_rule(&self, scope: &Scope, rule: &str) -> Result<Vec<Violation>>;
}

/// Configuration for the Vale runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValeConfig {
    /// Program and leading arguments, e.g. `["vale", "--output=JSON"]`.
    pub command: Vec<String>,

    /// Style namespace the rules live in.
    pub namespace: String,

    /// Kill the linter after this many seconds; 0 disables the limit.
    pub timeout_secs: u64,
}

impl Default for ValeConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "vale".to_string(),
                "--output=JSON".to_string(),
                "--no-exit".to_string(),
            ],
            namespace: "AsciiDocDITA".to_string(),
            timeout_secs: 300,
        }
    }
}

/// `RuleRunner` backed by the Vale CLI.
#[derive(Debug, Clone, Default)]
pub struct ValeRunner {
    config: ValeConfig,
}

impl ValeRunner {
    pub fn new(config: ValeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValeConfig {
        &self.config
    }

    /// Arguments appended after the configured command.
    fn args(&self, scope: &Scope, rule: &str) -> Vec<String> {
        let mut args = vec![format!(
            "--filter=.Name==\"{}.{rule}\"",
            self.config.namespace
        )];
        args.extend(scope.files().iter().map(|f| f.to_string_lossy().to_string()));
        args
    }
}

#[async_trait]
impl RuleRunner for ValeRunner {
    async fn run_rule(&self, scope: &Scope, rule: &str) -> Result<Vec<Violation>> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        let Some((exe, leading)) = self.config.command.split_first() else {
            return Err(RemedyError::Config("linter command is empty".to_string()));
        };

        let start = Instant::now();
        let child = Command::new(exe)
            .args(leading)
            .args(self.args(scope, rule))
            .current_dir(scope.root())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RemedyError::Linter(format!("failed to run {exe}: {e}")))?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                RemedyError::Linter(format!(
                    "{exe} timed out after {} seconds",
                    self.config.timeout_secs
                ))
            })??
        } else {
            child.wait_with_output().await?
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemedyError::Linter(format!(
                "{exe} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let index = ViolationIndex::parse(&stdout, rule, &self.config.namespace)?;
        debug!(rule, duration_ms = start.elapsed().as_millis() as u64, "linter finished");
        info!(rule, files = index.files().count(), violations = index.len(), "linted scope");
        Ok(index.into_violations())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::*;

    fn scope_with(dir: &Path) -> Scope {
        fs::write(dir.join("con_a.adoc"), "= A\n").unwrap();
        Scope::from_files(dir, vec![PathBuf::from("con_a.adoc")])
    }

    fn shell(script: &str, timeout_secs: u64) -> ValeRunner {
        ValeRunner::new(ValeConfig {
            command: vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
            timeout_secs,
            ..ValeConfig::default()
        })
    }

    #[test]
    fn test_default_config() {
        let config = ValeConfig::default();
        assert_eq!(config.command[0], "vale");
        assert!(config.command.contains(&"--output=JSON".to_string()));
        assert_eq!(config.namespace, "AsciiDocDITA");
    }

    #[test]
    fn test_args_filter_and_files() {
        let runner = ValeRunner::default();
        let scope = Scope::from_files(Path::new("/r"), vec![PathBuf::from("b.adoc"), PathBuf::from("a.adoc")]);
        let args = runner.args(&scope, "PageBreak");
        assert_eq!(args[0], "--filter=.Name==\"AsciiDocDITA.PageBreak\"");
        assert_eq!(&args[1..], &["a.adoc".to_string(), "b.adoc".to_string()]);
    }

    #[tokio::test]
    async fn test_run_rule_parses_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let scope = scope_with(dir.path());
        fs::write(
            dir.path().join("out.json"),
            r#"{"con_a.adoc": [{"Check": "AsciiDocDITA.PageBreak", "Line": 1, "Message": "m", "Severity": "error"}]}"#,
        )
        .unwrap();

        let runner = shell("cat out.json", 30);
        let vs = runner.run_rule(&scope, "PageBreak").await.unwrap();
        assert_eq!(vs.len(), 1);
        assert_eq!(vs[0].file_path, PathBuf::from("con_a.adoc"));
    }

    #[tokio::test]
    async fn test_run_rule_surfaces_failure() {
        let dir = tempfile::tempdir().unwrap();
        let scope = scope_with(dir.path());
        let err = shell("echo boom >&2; exit 2", 30)
            .run_rule(&scope, "PageBreak")
            .await
            .unwrap_err();
        assert!(matches!(err, RemedyError::Linter(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn test_run_rule_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let scope = scope_with(dir.path());
        let err = shell("sleep 5", 1).run_rule(&scope, "PageBreak").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_scope_skips_linter() {
        let runner = ValeRunner::new(ValeConfig {
            command: vec!["definitely-not-installed".into()],
            ..ValeConfig::default()
        });
        let scope = Scope::from_files(Path::new("/nowhere"), Vec::new());
        assert!(runner.run_rule(&scope, "PageBreak").await.unwrap().is_empty());
    }
}
