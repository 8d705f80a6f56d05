//! `ditafix.toml` discovery and effective settings.
//!
//! The file lives at the repository root, found by walking up from the
//! working directory to the first ancestor holding `ditafix.toml` or
//! `.git`. Every section is optional:
//!
//! ```toml
//! [linter]
//! command = ["podman", "run", "--rm", "-v", ".:/docs", "vale", "--output=JSON"]
//! namespace = "AsciiDocDITA"
//! timeout_secs = 600
//!
//! [flags]
//! resource_base_url = "https://example.com/rules"
//!
//! [reports]
//! dir = ".ditafix/reports"
//!
//! [session]
//! path = "/tmp/journey.json"
//! ```
//!
//! Precedence: CLI flags and `DITAFIX_*` variables (resolved by clap) >
//! file > defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotator::{CommentAnnotator, DEFAULT_RESOURCE_BASE_URL};
use crate::domain::{RemedyError, Result};
use crate::journey::{SessionStore, DEFAULT_REPORTS_DIR};
use crate::linter::ValeConfig;

pub const CONFIG_FILE: &str = "ditafix.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    /// Base URL the flag comments link rule definitions under.
    pub resource_base_url: String,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            resource_base_url: DEFAULT_RESOURCE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Relative paths are taken from the repository root.
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_REPORTS_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session file; the user config directory when unset.
    pub path: Option<PathBuf>,
}

/// Settings from the command line, already merged with the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub linter_command: Option<Vec<String>>,
    pub linter_timeout_secs: Option<u64>,
    pub resource_base_url: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub session_path: Option<PathBuf>,
}

/// Effective ditafix configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub linter: ValeConfig,
    pub flags: FlagsConfig,
    pub reports: ReportsConfig,
    pub session: SessionConfig,
}

impl RemedyConfig {
    /// Parse a `ditafix.toml` body.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RemedyError::Config(e.to_string()))
    }

    /// Load `<root>/ditafix.toml`, or the defaults when there is none.
    ///
    /// # Errors
    ///
    /// `Config` when the file exists but does not parse.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)
            .map_err(|e| RemedyError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Apply command-line settings on top of the file.
    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(command) = overrides.linter_command.filter(|c| !c.is_empty()) {
            self.linter.command = command;
        }
        if let Some(timeout) = overrides.linter_timeout_secs {
            self.linter.timeout_secs = timeout;
        }
        if let Some(url) = overrides.resource_base_url {
            self.flags.resource_base_url = url;
        }
        if let Some(dir) = overrides.reports_dir {
            self.reports.dir = dir;
        }
        if let Some(path) = overrides.session_path {
            self.session.path = Some(path);
        }
        self
    }

    pub fn annotator(&self) -> CommentAnnotator {
        CommentAnnotator::new(self.flags.resource_base_url.clone())
    }

    /// Report directory for a repository at `root`.
    pub fn reports_dir(&self, root: &Path) -> PathBuf {
        if self.reports.dir.is_absolute() {
            self.reports.dir.clone()
        } else {
            root.join(&self.reports.dir)
        }
    }

    /// Session file location.
    ///
    /// # Errors
    ///
    /// `Config` when no path is set and the platform has no config
    /// directory.
    pub fn session_path(&self) -> Result<PathBuf> {
        self.session
            .path
            .clone()
            .or_else(SessionStore::default_path)
            .ok_or_else(|| {
                RemedyError::Config("no user config directory; set [session] path".to_string())
            })
    }
}

/// Walk up from `start` to the first directory holding `ditafix.toml` or
/// `.git`. Falls back to `start`.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if cur.join(CONFIG_FILE).exists() || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(parent) => cur = parent,
            None => return start.to_path_buf(),
        }
    }
}
