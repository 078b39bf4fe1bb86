//! Advisory, owner-tagged lock for a session directory.
//!
//! The lock is the file `_session.json.lock`. It is taken with `create_new` so exactly one
//! process can create it, and it records who holds it:
//!
//! ```json
//! {"owner":"3fa1c2d9","pid":4242,"acquired_at":"2026-01-11T10:00:00Z"}
//! ```
//!
//! A plain-text marker containing only the owner token is also understood.
//!
//! There is no lease. A crashed holder leaves its marker behind; contention errors report the
//! marker's age and whether it is older than the configured staleness threshold, and
//! [`break_lock`] removes a stale marker on explicit request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CoordError;
use crate::paths;

pub const DEFAULT_MAX_RETRIES: usize = 8;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 600;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 6_400;

/// Settings for [`acquire`] and [`break_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Retries after the first failed attempt before giving up.
    pub max_retries: usize,
    /// Age after which a marker is considered stale. Zero disables staleness.
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

/// Delay before retry number `attempt` (0-based): 100, 200, ... 3200, 6400, 6400, ... ms.
pub fn backoff_delay(attempt: usize) -> Duration {
    let shift = attempt.min(16) as u32;
    let ms = INITIAL_BACKOFF_MS
        .saturating_mul(1_u64 << shift)
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

/// Contents of the lock marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
}

impl LockMarker {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            pid: Some(std::process::id()),
            acquired_at: Some(Utc::now()),
        }
    }

    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        serde_json::from_str(trimmed).unwrap_or_else(|_| Self {
            owner: trimmed.lines().next().unwrap_or_default().trim().to_string(),
            pid: None,
            acquired_at: None,
        })
    }
}

/// Observed state of a lock marker.
#[derive(Debug, Clone, Serialize)]
pub struct LockInfo {
    pub path: PathBuf,
    pub owner: Option<String>,
    pub pid: Option<u32>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub stale: bool,
}

/// Outcome of [`release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    NotHeld,
}

/// A held session lock. Dropping the guard releases the lock if this guard created it.
#[derive(Debug)]
pub struct LockGuard {
    path: Option<PathBuf>,
    owner: String,
    owns_marker: bool,
}

impl LockGuard {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether the marker already belonged to this owner when the guard was taken.
    pub fn is_reentrant(&self) -> bool {
        !self.owns_marker
    }

    /// Release the lock now, surfacing any error.
    pub fn release(mut self) -> Result<(), CoordError> {
        self.release_inner()
    }

    /// Leave the marker on disk after this guard goes away (manual `lock acquire`).
    pub fn persist(mut self) {
        self.path = None;
    }

    fn release_inner(&mut self) -> Result<(), CoordError> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        if !self.owns_marker {
            return Ok(());
        }
        let session_dir = path.parent().unwrap_or_else(|| Path::new("."));
        release(session_dir, &self.owner).map(|_| ())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(owner = %self.owner, "failed to release session lock: {e}");
        }
    }
}

fn read_marker(path: &Path) -> Result<Option<LockMarker>, CoordError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(LockMarker::parse(&raw))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoordError::io("read lock file", path, e)),
    }
}

fn marker_age_secs(path: &Path, marker: &LockMarker) -> Option<i64> {
    let since = match marker.acquired_at {
        Some(at) => at,
        None => {
            let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
            DateTime::<Utc>::from(modified)
        }
    };
    Some((Utc::now() - since).num_seconds().max(0))
}

fn is_stale(age_secs: Option<i64>, cfg: &LockConfig) -> bool {
    let threshold = cfg.stale_after.as_secs();
    match age_secs {
        Some(age) if threshold > 0 => age as u64 >= threshold,
        _ => false,
    }
}

/// Inspect the lock for `session_dir` without touching it.
pub fn inspect(session_dir: &Path, cfg: &LockConfig) -> Result<Option<LockInfo>, CoordError> {
    let path = paths::lock_file(session_dir);
    let Some(marker) = read_marker(&path)? else {
        return Ok(None);
    };
    let age_secs = marker_age_secs(&path, &marker);
    Ok(Some(LockInfo {
        owner: Some(marker.owner.clone()).filter(|o| !o.is_empty()),
        pid: marker.pid,
        acquired_at: marker.acquired_at,
        age_secs,
        stale: is_stale(age_secs, cfg),
        path,
    }))
}

/// Acquire the lock for `session_dir` as `owner`.
///
/// Retries with [`backoff_delay`] while another owner holds the lock, up to
/// `cfg.max_retries` retries, then fails with [`CoordError::LockContention`]. If `owner`
/// already holds the marker the call succeeds immediately and the returned guard leaves the
/// marker in place when dropped.
pub fn acquire(session_dir: &Path, owner: &str, cfg: &LockConfig) -> Result<LockGuard, CoordError> {
    crate::id::validate("lock owner", owner)?;
    let path = paths::lock_file(session_dir);
    let mut attempt: usize = 0;

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let marker = serde_json::to_string(&LockMarker::new(owner))
                    .map_err(|e| CoordError::Other(e.into()))?;
                let written = writeln!(file, "{marker}").and_then(|_| file.sync_all());
                if let Err(e) = written {
                    let _ = fs::remove_file(&path);
                    return Err(CoordError::io("write lock file", &path, e));
                }
                debug!(owner, attempt, path = %path.display(), "acquired session lock");
                return Ok(LockGuard {
                    path: Some(path),
                    owner: owner.to_string(),
                    owns_marker: true,
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let Some(marker) = read_marker(&path)? else {
                    // Released between our create attempt and the read; try again right away.
                    continue;
                };
                if marker.owner == owner {
                    debug!(owner, "session lock already held by this owner");
                    return Ok(LockGuard {
                        path: Some(path),
                        owner: owner.to_string(),
                        owns_marker: false,
                    });
                }
                if attempt >= cfg.max_retries {
                    let age_secs = marker_age_secs(&path, &marker);
                    let stale = is_stale(age_secs, cfg);
                    if stale {
                        warn!(holder = %marker.owner, ?age_secs, "session lock looks stale");
                    }
                    return Err(CoordError::LockContention {
                        holder: Some(marker.owner).filter(|o| !o.is_empty()),
                        attempts: attempt + 1,
                        age_secs,
                        stale,
                        path,
                    });
                }
                let delay = backoff_delay(attempt);
                debug!(
                    owner,
                    holder = %marker.owner,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "session lock busy, backing off"
                );
                sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(CoordError::io("create lock file", &path, e)),
        }
    }
}

/// Release the lock if `owner` holds it.
///
/// A missing lock is a successful no-op. A lock held by a different owner is never removed;
/// that case is an error.
pub fn release(session_dir: &Path, owner: &str) -> Result<ReleaseOutcome, CoordError> {
    let path = paths::lock_file(session_dir);
    let Some(marker) = read_marker(&path)? else {
        return Ok(ReleaseOutcome::NotHeld);
    };
    if marker.owner != owner {
        return Err(CoordError::LockHeldByOther {
            path,
            holder: marker.owner,
            caller: owner.to_string(),
        });
    }
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(owner, "released session lock");
            Ok(ReleaseOutcome::Released)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ReleaseOutcome::NotHeld),
        Err(e) => Err(CoordError::io("remove lock file", &path, e)),
    }
}

/// Remove a lock regardless of owner. Without `force` only a stale lock is removed.
///
/// Returns the marker that was removed, or `None` if there was no lock.
pub fn break_lock(
    session_dir: &Path,
    cfg: &LockConfig,
    force: bool,
) -> Result<Option<LockInfo>, CoordError> {
    let Some(info) = inspect(session_dir, cfg)? else {
        return Ok(None);
    };
    if !info.stale && !force {
        return Err(CoordError::InvalidTransition {
            field: "lock".to_string(),
            from: info.owner.clone().unwrap_or_else(|| "unknown".to_string()),
            to: "broken".to_string(),
            reason: format!(
                "lock is {}s old, below the {}s staleness threshold; pass --force to break it anyway",
                info.age_secs.unwrap_or(0),
                cfg.stale_after.as_secs()
            ),
        });
    }
    if !remove_if_unchanged(session_dir, &info)? {
        return Ok(None);
    }
    warn!(
        holder = ?info.owner,
        age_secs = ?info.age_secs,
        forced = force,
        "broke session lock"
    );
    Ok(Some(info))
}

fn same_holder(info: &LockInfo, marker: &LockMarker) -> bool {
    info.owner.as_deref().unwrap_or_default() == marker.owner
        && info.pid == marker.pid
        && info.acquired_at == marker.acquired_at
}

/// Remove the marker described by `info`, but only that one.
///
/// The marker is first renamed aside so the check and the removal apply to the same file. If a
/// new holder took the lock after `info` was read, its marker is put back and the break fails.
/// Returns `false` if the lock had already gone.
fn remove_if_unchanged(session_dir: &Path, info: &LockInfo) -> Result<bool, CoordError> {
    let aside = session_dir.join(format!(
        "{}.broken.{}",
        paths::LOCK_FILE,
        crate::id::random_id8()?
    ));
    match fs::rename(&info.path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CoordError::io("move lock file aside", &info.path, e)),
    }

    let moved = read_marker(&aside)?;
    if moved.as_ref().is_none_or(|marker| same_holder(info, marker)) {
        fs::remove_file(&aside).map_err(|e| CoordError::io("remove lock file", &aside, e))?;
        return Ok(moved.is_some());
    }

    // Restoring with a hard link never replaces a lock taken in the meantime.
    match fs::hard_link(&aside, &info.path) {
        Ok(()) => {}
        Err(e) => warn!(path = %info.path.display(), "could not restore session lock: {e}"),
    }
    let _ = fs::remove_file(&aside);
    let holder = moved.map(|m| m.owner).unwrap_or_default();
    Err(CoordError::InvalidTransition {
        field: "lock".to_string(),
        from: info.owner.clone().unwrap_or_else(|| "unknown".to_string()),
        to: "broken".to_string(),
        reason: format!("lock was taken over by {holder} while breaking it; left in place"),
    })
}
