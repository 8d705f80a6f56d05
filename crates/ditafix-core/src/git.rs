//! Git collaborator.
//!
//! `GitBackend` is the narrow set of repository operations the journey
//! needs. `GitCli` implements it with the `git` binary and opens change
//! requests through the GitHub CLI (`gh`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{RemedyError, Result};

/// A change request to open or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait GitBackend: Send + Sync {
    async fn current_branch(&self) -> Result<String>;

    async fn checkout(&self, branch: &str) -> Result<()>;

    /// Create `name` from `from` and switch to it. Switches to the
    /// existing branch when it is already there.
    async fn create_branch(&self, name: &str, from: &str) -> Result<()>;

    /// Stage `paths` (everything when empty) and commit.
    ///
    /// Returns the new commit SHA, or `None` when nothing was staged.
    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<Option<String>>;

    async fn push(&self, branch: &str) -> Result<()>;

    /// Open a change request, or update the one already open for
    /// `request.head`. Returns its URL or identifier.
    async fn open_change_request(&self, request: &ChangeRequest) -> Result<String>;
}

struct Output {
    success: bool,
    stdout: String,
    stderr: String,
}

/// `GitBackend` over the `git` and `gh` binaries.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn exec(&self, program: &str, args: &[&str]) -> Result<Output> {
        debug!(program, ?args, "running");
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| RemedyError::Git(format!("failed to run {program}: {e}")))?;
        Ok(Output {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let out = self.exec("git", args).await?;
        if !out.success {
            return Err(RemedyError::Git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                out.stderr
            )));
        }
        Ok(out.stdout)
    }

    /// SHA of HEAD.
    pub async fn head_sha(&self) -> Result<String> {
        let sha = self.git(&["rev-parse", "HEAD"]).await?;
        if sha.is_empty() {
            return Err(RemedyError::Git(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }

    async fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        let out = self
            .exec("git", &["rev-parse", "--verify", "--quiet", &refname])
            .await?;
        Ok(out.success)
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", branch]).await.map(|_| ())
    }

    async fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        if self.branch_exists(name).await? {
            debug!(branch = name, "branch exists, switching");
            return self.checkout(name).await;
        }
        self.git(&["checkout", "-b", name, from]).await?;
        info!(branch = name, from, "created branch");
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[PathBuf]) -> Result<Option<String>> {
        if paths.is_empty() {
            self.git(&["add", "-A"]).await?;
        } else {
            let mut args = vec!["add".to_string(), "--".to_string()];
            args.extend(paths.iter().map(|p| p.to_string_lossy().to_string()));
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            self.git(&refs).await?;
        }

        let staged = self.exec("git", &["diff", "--cached", "--quiet"]).await?;
        if staged.success {
            debug!("nothing staged, skipping commit");
            return Ok(None);
        }
        self.git(&["commit", "-m", message]).await?;
        let sha = self.head_sha().await?;
        info!(sha = %sha, "committed");
        Ok(Some(sha))
    }

    async fn push(&self, branch: &str) -> Result<()> {
        self.git(&["push", "--set-upstream", &self.remote, branch])
            .await
            .map(|_| ())
    }

    async fn open_change_request(&self, request: &ChangeRequest) -> Result<String> {
        let created = self
            .exec(
                "gh",
                &[
                    "pr",
                    "create",
                    "--base",
                    &request.base,
                    "--head",
                    &request.head,
                    "--title",
                    &request.title,
                    "--body",
                    &request.body,
                ],
            )
            .await?;
        if created.success {
            info!(url = %created.stdout, "opened change request");
            return Ok(created.stdout);
        }
        if !created.stderr.contains("already exists") {
            return Err(RemedyError::Git(format!(
                "gh pr create failed: {}",
                created.stderr
            )));
        }

        let edited = self
            .exec(
                "gh",
                &[
                    "pr",
                    "edit",
                    &request.head,
                    "--title",
                    &request.title,
                    "--body",
                    &request.body,
                ],
            )
            .await?;
        if !edited.success {
            return Err(RemedyError::Git(format!(
                "gh pr edit failed: {}",
                edited.stderr
            )));
        }
        info!(head = %request.head, "updated change request");
        Ok(edited.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["checkout", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = GitCli::new(repo.path()).head_sha().await.unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitCli::new(dir.path()).head_sha().await.is_err());
    }

    #[tokio::test]
    async fn create_branch_commit_and_switch_back() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        assert_eq!(git.current_branch().await.unwrap(), "main");

        git.create_branch("ditafix/remediation", "main").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "ditafix/remediation");

        std::fs::write(repo.path().join("con_a.adoc"), "= A\n").unwrap();
        let sha = git
            .commit("ditafix: EntityReference", &[PathBuf::from("con_a.adoc")])
            .await
            .unwrap();
        assert!(sha.is_some());

        // Nothing changed since the last commit.
        let again = git.commit("ditafix: EntityReference", &[]).await.unwrap();
        assert!(again.is_none());

        git.checkout("main").await.unwrap();
        git.create_branch("ditafix/remediation", "main").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "ditafix/remediation");
        assert!(repo.path().join("con_a.adoc").exists());
    }

    #[tokio::test]
    async fn checkout_unknown_branch_fails() {
        let repo = make_git_repo();
        let err = GitCli::new(repo.path()).checkout("nope").await.unwrap_err();
        assert!(matches!(err, RemedyError::Git(_)));
    }
}
