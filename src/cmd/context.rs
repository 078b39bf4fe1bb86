//! Resolve the shared session flags into paths, settings and a store.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use revsync::config::EffectiveConfig;
use revsync::id;
use revsync::paths;
use revsync::session::{SessionSeed, SessionStore};

use crate::{LockArgs, SessionArgs};

/// Everything a command needs to find and open a session.
#[derive(Debug)]
pub struct SessionContext {
    pub repo_root: PathBuf,
    pub date: NaiveDate,
    pub session_dir: PathBuf,
    pub config: EffectiveConfig,
}

impl SessionContext {
    pub fn resolve(args: &SessionArgs) -> Result<Self> {
        let repo_root = resolve_repo_root(args.repo_root.as_deref())?;

        let date = match (&args.date, &args.session_dir) {
            (Some(raw), _) => paths::parse_date(raw)?,
            // A session directory is named after its date.
            (None, Some(dir)) => dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
                .unwrap_or_else(|| Utc::now().date_naive()),
            (None, None) => Utc::now().date_naive(),
        };

        let session_dir = match &args.session_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => std::env::current_dir()
                .context("Failed to read current directory")?
                .join(dir),
            None => paths::session_dir(&repo_root, date),
        };

        let config = EffectiveConfig::resolve(&paths::config_file(&repo_root))?;

        debug!(
            repo_root = %repo_root.display(),
            session_dir = %session_dir.display(),
            %date,
            "resolved session context"
        );
        Ok(Self {
            repo_root,
            date,
            session_dir,
            config,
        })
    }

    /// Apply `--max-retries` on top of file and env settings.
    pub fn with_max_retries(mut self, max_retries: Option<usize>) -> Self {
        self.config.override_max_retries(max_retries);
        self
    }

    pub fn store(&self) -> SessionStore {
        SessionStore::new(self.session_dir.clone(), self.config.settings.lock_config())
    }

    pub fn seed(&self) -> SessionSeed {
        SessionSeed::new(&self.repo_root, self.date)
    }
}

/// Flag, else the enclosing git checkout, else the current directory.
pub fn resolve_repo_root(flag: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let root = match flag {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => cwd.join(dir),
        None => paths::discover_repo_root(&cwd).unwrap_or(cwd),
    };
    Ok(root)
}

/// The `--lock-owner` token, or a fresh one for this invocation.
pub fn lock_owner(args: &LockArgs) -> Result<String> {
    match &args.lock_owner {
        Some(owner) => {
            id::validate("lock owner", owner)?;
            Ok(owner.clone())
        }
        None => Ok(id::random_id8()?),
    }
}
