//! Durable storage for the journey session.
//!
//! Layout, next to the record:
//!
//! - `journey.json`: the session, pretty JSON
//! - `journey.json.sha256`: hex SHA-256 of the record bytes
//! - `journey.json.<YYYYmmddTHHMMSSmmm>.bak`: the prior version, taken
//!   before every save

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::{JourneyError, JourneyResult};
use super::session::JourneySession;

/// Number of backups kept by default.
pub const DEFAULT_KEEP_BACKUPS: usize = 10;

const FILE_NAME: &str = "journey.json";

/// Loads and persists the session record at a fixed location.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    keep_backups: usize,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep_backups: DEFAULT_KEEP_BACKUPS,
        }
    }

    /// `<config_dir>/ditafix/journey.json` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ditafix").join(FILE_NAME))
    }

    pub fn with_keep_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn digest_path(&self) -> PathBuf {
        sibling(&self.path, "sha256")
    }

    fn staged_digest_path(&self) -> PathBuf {
        sibling(&self.path, "sha256.tmp")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the record, verifying its digest.
    ///
    /// Returns `Ok(None)` when no session has been saved yet.
    pub fn load(&self) -> JourneyResult<Option<JourneySession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;

        let digest_path = self.digest_path();
        if digest_path.exists() {
            let expected = fs::read_to_string(&digest_path)?;
            let actual = digest_hex(&bytes);
            if expected.trim() != actual && !self.finish_interrupted_save(&actual)? {
                return Err(self.corrupt(format!(
                    "digest mismatch: expected {}, got {actual}",
                    expected.trim()
                )));
            }
        } else {
            warn!(path = %self.path.display(), "session digest missing");
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.corrupt(format!("cannot decode session: {e}")))
    }

    /// Back up the current record, then write `session` and its digest.
    ///
    /// Both files are staged as `.tmp` siblings first. The record is renamed
    /// into place before the digest, so an interrupted save leaves either the
    /// old pair or a new record whose digest is still staged; `load` finishes
    /// the latter.
    pub fn save(&self, session: &JourneySession) -> JourneyResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            self.backup(Utc::now())?;
        }

        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| self.corrupt(format!("cannot encode session: {e}")))?;
        let tmp = sibling(&self.path, "tmp");
        let digest_tmp = self.staged_digest_path();
        write_synced(&tmp, &json)?;
        write_synced(&digest_tmp, digest_hex(&json).as_bytes())?;

        fs::rename(&tmp, &self.path)?;
        fs::rename(&digest_tmp, self.digest_path())?;
        debug!(path = %self.path.display(), state = %session.state, "session saved");
        Ok(())
    }

    /// Complete a save that stopped between the two renames.
    ///
    /// Returns `true` when the staged digest matches the record on disk.
    fn finish_interrupted_save(&self, actual: &str) -> JourneyResult<bool> {
        let staged = self.staged_digest_path();
        if !staged.exists() {
            return Ok(false);
        }
        if fs::read_to_string(&staged)?.trim() != actual {
            return Ok(false);
        }
        fs::rename(&staged, self.digest_path())?;
        info!(path = %self.path.display(), "completed interrupted session save");
        Ok(true)
    }

    /// Remove the record and digest. Backups are kept.
    pub fn reset(&self) -> JourneyResult<()> {
        if self.path.exists() {
            self.backup(Utc::now())?;
            fs::remove_file(&self.path)?;
        }
        let digest = self.digest_path();
        if digest.exists() {
            fs::remove_file(digest)?;
        }
        info!(path = %self.path.display(), "session reset");
        Ok(())
    }

    /// Backups, newest first.
    pub fn backups(&self) -> JourneyResult<Vec<PathBuf>> {
        let Some(dir) = self.path.parent() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.", self.file_name());
        let mut found: Vec<(String, u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stamp) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".bak"))
            else {
                continue;
            };
            let (ts, seq) = match stamp.split_once('-') {
                Some((ts, seq)) => (ts.to_string(), seq.parse().unwrap_or(0)),
                None => (stamp.to_string(), 0),
            };
            found.push((ts, seq, path));
        }
        found.sort_by(|a, b| (&b.0, b.1).cmp(&(&a.0, a.1)));
        Ok(found.into_iter().map(|(_, _, p)| p).collect())
    }

    pub fn newest_backup(&self) -> Option<PathBuf> {
        self.backups().ok().and_then(|b| b.into_iter().next())
    }

    fn backup(&self, now: DateTime<Utc>) -> JourneyResult<PathBuf> {
        let stamp = now.format("%Y%m%dT%H%M%S%3f").to_string();
        let mut target = sibling(&self.path, &format!("{stamp}.bak"));
        let mut seq = 1;
        while target.exists() {
            target = sibling(&self.path, &format!("{stamp}-{seq}.bak"));
            seq += 1;
        }
        fs::copy(&self.path, &target)?;
        debug!(backup = %target.display(), "session backed up");

        for stale in self.backups()?.into_iter().skip(self.keep_backups) {
            fs::remove_file(&stale)?;
        }
        Ok(target)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| FILE_NAME.to_string())
    }

    fn corrupt(&self, reason: String) -> JourneyError {
        JourneyError::SessionCorrupt {
            path: self.path.clone(),
            reason,
            backup: self.newest_backup(),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| FILE_NAME.to_string());
    path.with_file_name(format!("{name}.{suffix}"))
}

fn write_synced(path: &Path, bytes: &[u8]) -> JourneyResult<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::state::JourneyState;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("ditafix").join("journey.json"));
        (dir, store)
    }

    #[test]
    fn test_load_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_roundtrip_with_digest() {
        let (_dir, store) = store();
        let mut session = JourneySession::new(Utc::now());
        session.transition(JourneyState::ConfiguringRepo, Utc::now()).unwrap();
        store.save(&session).unwrap();

        assert!(store.digest_path().exists());
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_each_save_backs_up_prior_version() {
        let (_dir, store) = store();
        let store = store.with_keep_backups(3);
        let mut session = JourneySession::new(Utc::now());
        store.save(&session).unwrap();
        assert!(store.backups().unwrap().is_empty());

        for i in 0..5 {
            session.note(Utc::now(), format!("save {i}"));
            store.save(&session).unwrap();
        }
        let backups = store.backups().unwrap();
        assert_eq!(backups.len(), 3);

        // The newest backup holds the version before the last save.
        let newest: JourneySession =
            serde_json::from_slice(&fs::read(&backups[0]).unwrap()).unwrap();
        assert_eq!(newest.notes.len(), 4);
    }

    #[test]
    fn test_tampered_record_is_corrupt() {
        let (_dir, store) = store();
        let session = JourneySession::new(Utc::now());
        store.save(&session).unwrap();
        store.save(&session).unwrap();

        let mut text = fs::read_to_string(store.path()).unwrap();
        text = text.replace("unconfigured", "ready");
        fs::write(store.path(), text).unwrap();

        match store.load().unwrap_err() {
            JourneyError::SessionCorrupt { reason, backup, .. } => {
                assert!(reason.contains("digest mismatch"));
                assert!(backup.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undecodable_record_is_corrupt() {
        let (_dir, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, JourneyError::SessionCorrupt { .. }));
    }

    #[test]
    fn test_save_interrupted_after_record_rename_still_loads() {
        let (_dir, store) = store();
        let mut session = JourneySession::new(Utc::now());
        store.save(&session).unwrap();

        // New record renamed into place, digest still staged.
        session.note(Utc::now(), "second save");
        let json = serde_json::to_vec_pretty(&session).unwrap();
        fs::write(store.path(), &json).unwrap();
        fs::write(store.staged_digest_path(), digest_hex(&json)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(!store.staged_digest_path().exists());
        assert_eq!(
            fs::read_to_string(store.digest_path()).unwrap(),
            digest_hex(&json)
        );
    }

    #[test]
    fn test_save_interrupted_before_record_rename_keeps_old_record() {
        let (_dir, store) = store();
        let session = JourneySession::new(Utc::now());
        store.save(&session).unwrap();

        let mut next = session.clone();
        next.note(Utc::now(), "never landed");
        let json = serde_json::to_vec_pretty(&next).unwrap();
        fs::write(sibling(store.path(), "tmp"), &json).unwrap();
        fs::write(store.staged_digest_path(), digest_hex(&json)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);

        // The next save replaces the stale staging files.
        store.save(&next).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), next);
    }

    #[test]
    fn test_stale_staged_digest_does_not_hide_tampering() {
        let (_dir, store) = store();
        let session = JourneySession::new(Utc::now());
        store.save(&session).unwrap();
        fs::write(store.staged_digest_path(), "0000").unwrap();
        fs::write(store.path(), "{\"tampered\": true}").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, JourneyError::SessionCorrupt { .. }));
    }

    #[test]
    fn test_reset_removes_record() {
        let (_dir, store) = store();
        store.save(&JourneySession::new(Utc::now())).unwrap();
        store.reset().unwrap();
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.backups().unwrap().len(), 1);
    }
}
