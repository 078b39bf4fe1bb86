//! Loading and locked, atomic rewriting of `_session.json`.

use chrono::NaiveDate;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::model::{Role, SessionDocument};
use super::ownership;
use crate::errors::CoordError;
use crate::lock::{self, LockConfig};
use crate::paths;

/// What a session document is created from when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSeed {
    pub repo_root: String,
    pub session_date: NaiveDate,
}

impl SessionSeed {
    pub fn new(repo_root: &Path, session_date: NaiveDate) -> Self {
        Self {
            repo_root: repo_root.display().to_string(),
            session_date,
        }
    }
}

/// Handle on one session directory.
///
/// Holds no document state: every read goes to disk, and every mutation re-reads the file
/// after taking the lock.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    lock: LockConfig,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, lock: LockConfig) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self) -> PathBuf {
        paths::session_file(&self.dir)
    }

    pub fn lock_config(&self) -> &LockConfig {
        &self.lock
    }

    /// Read the document, or `None` if the session has not been created.
    pub fn load(&self) -> Result<Option<SessionDocument>, CoordError> {
        let path = self.file();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoordError::io("read session file", &path, e)),
        };
        SessionDocument::from_json(&raw, &path).map(Some)
    }

    /// Read the document; a missing session is an error.
    pub fn load_required(&self) -> Result<SessionDocument, CoordError> {
        self.load()?
            .ok_or_else(|| CoordError::SessionNotFound { path: self.file() })
    }

    /// Create the directory and an empty document if needed. Idempotent.
    pub fn ensure_exists(
        &self,
        seed: &SessionSeed,
        owner: &str,
    ) -> Result<SessionDocument, CoordError> {
        if let Some(doc) = self.load()? {
            return Ok(doc);
        }
        self.mutate_or_create(seed, owner, Role::Reviewer, |doc| Ok(doc.clone()))
    }

    /// Apply `f` to the current document under the session lock.
    ///
    /// Fails with [`CoordError::SessionNotFound`] if the session does not exist.
    pub fn mutate<T, F>(&self, owner: &str, role: Role, f: F) -> Result<T, CoordError>
    where
        F: FnOnce(&mut SessionDocument) -> Result<T, CoordError>,
    {
        if !self.dir.is_dir() {
            return Err(CoordError::SessionNotFound { path: self.file() });
        }
        self.locked(owner, role, None, f)
    }

    /// Like [`mutate`](Self::mutate), creating the session from `seed` if it does not exist.
    pub fn mutate_or_create<T, F>(
        &self,
        seed: &SessionSeed,
        owner: &str,
        role: Role,
        f: F,
    ) -> Result<T, CoordError>
    where
        F: FnOnce(&mut SessionDocument) -> Result<T, CoordError>,
    {
        fs::create_dir_all(&self.dir)
            .map_err(|e| CoordError::io("create session directory", &self.dir, e))?;
        self.locked(owner, role, Some(seed), f)
    }

    fn locked<T, F>(
        &self,
        owner: &str,
        role: Role,
        seed: Option<&SessionSeed>,
        f: F,
    ) -> Result<T, CoordError>
    where
        F: FnOnce(&mut SessionDocument) -> Result<T, CoordError>,
    {
        let guard = lock::acquire(&self.dir, owner, &self.lock)?;
        let result = self.apply(owner, role, seed, f);
        let released = guard.release();
        let value = result?;
        released?;
        Ok(value)
    }

    fn apply<T, F>(
        &self,
        owner: &str,
        role: Role,
        seed: Option<&SessionSeed>,
        f: F,
    ) -> Result<T, CoordError>
    where
        F: FnOnce(&mut SessionDocument) -> Result<T, CoordError>,
    {
        // Always start from what is on disk now, never from an earlier read.
        let (current, created) = match (self.load()?, seed) {
            (Some(doc), _) => (doc, false),
            (None, Some(seed)) => (
                SessionDocument::new(seed.repo_root.clone(), seed.session_date),
                true,
            ),
            (None, None) => return Err(CoordError::SessionNotFound { path: self.file() }),
        };

        let mut next = current.clone();
        let value = f(&mut next)?;
        ownership::check(role, &current, &next)?;
        next.validate().map_err(|reason| CoordError::MalformedSession {
            path: self.file(),
            reason,
        })?;

        if created {
            info!(dir = %self.dir.display(), date = %next.session_date, "created session");
        }
        if created || next != current {
            self.write(&next, owner)?;
        } else {
            debug!(owner, "mutation left session unchanged, skipping write");
        }
        Ok(value)
    }

    /// Replace `_session.json` with `doc` via a temp file and rename.
    fn write(&self, doc: &SessionDocument, owner: &str) -> Result<(), CoordError> {
        let target = self.file();
        let tmp = paths::session_temp_file(&self.dir, owner);

        let mut bytes =
            serde_json::to_vec_pretty(doc).map_err(|e| CoordError::Other(e.into()))?;
        bytes.push(b'\n');

        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(CoordError::io("write session temp file", &tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(CoordError::io("replace session file", &target, e));
        }
        debug!(owner, path = %target.display(), "wrote session file");
        Ok(())
    }
}
