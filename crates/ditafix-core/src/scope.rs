//! The set of AsciiDoc files a pass may touch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::Result;

/// Subdirectories the user allowed or blocked, relative to the repo root.
///
/// An empty allow list allows everything. A blocked directory always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubdirectoryPermissions {
    #[serde(default)]
    pub allow: Vec<PathBuf>,
    #[serde(default)]
    pub block: Vec<PathBuf>,
}

impl SubdirectoryPermissions {
    pub fn permits(&self, relative: &Path) -> bool {
        if self.block.iter().any(|b| relative.starts_with(b)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| relative.starts_with(a))
    }
}

/// Files in scope, as paths relative to `root`, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl Scope {
    /// Every `*.adoc` file under `root` outside hidden directories that the
    /// permissions allow.
    pub fn discover(root: &Path, permissions: &SubdirectoryPermissions) -> Result<Self> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        });
        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("adoc") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            if permissions.permits(relative) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        debug!(root = %root.display(), files = files.len(), "discovered scope");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// Scope over an explicit list of files relative to `root`.
    pub fn from_files(root: &Path, files: Vec<PathBuf>) -> Self {
        let mut files: Vec<PathBuf> = files
            .into_iter()
            .map(|f| f.strip_prefix(root).map(Path::to_path_buf).unwrap_or(f))
            .collect();
        files.sort();
        files.dedup();
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn contains(&self, relative: &Path) -> bool {
        self.files.binary_search_by(|f| f.as_path().cmp(relative)).is_ok()
    }

    /// Absolute path of a file in scope.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "= T\n").unwrap();
    }

    #[test]
    fn test_discover_skips_hidden_and_non_adoc() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "modules/con_a.adoc");
        touch(dir.path(), "assemblies/assembly_b.adoc");
        touch(dir.path(), ".git/x.adoc");
        touch(dir.path(), "modules/.cache/y.adoc");
        touch(dir.path(), "README.md");

        let scope = Scope::discover(dir.path(), &SubdirectoryPermissions::default()).unwrap();
        assert_eq!(
            scope.files(),
            &[
                PathBuf::from("assemblies/assembly_b.adoc"),
                PathBuf::from("modules/con_a.adoc")
            ]
        );
        assert!(scope.contains(Path::new("modules/con_a.adoc")));
    }

    #[test]
    fn test_permissions_block_wins() {
        let perms = SubdirectoryPermissions {
            allow: vec![PathBuf::from("modules")],
            block: vec![PathBuf::from("modules/legacy")],
        };
        assert!(perms.permits(Path::new("modules/con_a.adoc")));
        assert!(!perms.permits(Path::new("modules/legacy/con_b.adoc")));
        assert!(!perms.permits(Path::new("assemblies/assembly_c.adoc")));
        assert!(SubdirectoryPermissions::default().permits(Path::new("any/where.adoc")));
    }

    #[test]
    fn test_from_files_relativizes() {
        let root = Path::new("/repo");
        let scope = Scope::from_files(
            root,
            vec![PathBuf::from("/repo/b.adoc"), PathBuf::from("a.adoc"), PathBuf::from("a.adoc")],
        );
        assert_eq!(scope.files(), &[PathBuf::from("a.adoc"), PathBuf::from("b.adoc")]);
        assert_eq!(scope.resolve(Path::new("a.adoc")), PathBuf::from("/repo/a.adoc"));
    }
}
