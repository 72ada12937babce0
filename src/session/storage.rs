//! File-backed persistence for the login session.
//!
//! The web panel keeps `authToken`, `refreshToken` and `lastActivity` in
//! tab-scoped storage; the console keeps the same three values in a small
//! JSON file so a session survives between invocations.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub auth_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Last authenticated activity, epoch milliseconds.
    pub last_activity: i64,
}

#[derive(Clone, Debug)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted session, if any. A file that cannot be parsed is
    /// treated the same as no file at all: the caller ends up unauthenticated.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read session file {:?}", self.path));
            }
        };

        match serde_json::from_str(&raw) {
            Ok(stored) => Ok(Some(stored)),
            Err(err) => {
                warn!(%err, path = ?self.path, "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save(&self, stored: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create session directory {parent:?}"))?;
        }
        let raw = serde_json::to_string_pretty(stored)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write session file {:?}", self.path))
    }

    /// Remove the persisted session. Removing an absent file is a no-op.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove session file {:?}", self.path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredSession {
        StoredSession {
            auth_token: "header.payload.sig".to_string(),
            refresh_token: Some("refresh".to_string()),
            last_activity: 1_700_000_000_000,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path().join("nested").join("session.json"));

        file.save(&sample()).expect("save");
        let loaded = file.load().expect("load");
        assert_eq!(loaded, Some(sample()));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path().join("absent.json"));
        assert_eq!(file.load().expect("load"), None);
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").expect("write");

        let file = SessionFile::new(path);
        assert_eq!(file.load().expect("load"), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path().join("session.json"));

        file.save(&sample()).expect("save");
        file.clear().expect("first clear");
        file.clear().expect("second clear");
        assert_eq!(file.load().expect("load"), None);
    }
}
