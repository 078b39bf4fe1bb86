//! On-disk layout of review sessions.
//!
//! ```text
//! {repo_root}/.local/reports/code_reviews/
//!   revsync.toml                       # optional settings
//!   {YYYY-MM-DD}/
//!     _session.json                    # the session document
//!     _session.json.lock               # lock marker
//!     {HH-MM-SS-mmm}_{ref}_{reviewer}.md
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const SESSION_FILE: &str = "_session.json";
pub const LOCK_FILE: &str = "_session.json.lock";
pub const CONFIG_FILE: &str = "revsync.toml";

const MAX_REF_LEN: usize = 64;

/// Root directory holding every dated session directory for a repository.
pub fn reviews_root(repo_root: &Path) -> PathBuf {
    repo_root.join(".local").join("reports").join("code_reviews")
}

/// Session directory for `repo_root` on `date`.
pub fn session_dir(repo_root: &Path, date: NaiveDate) -> PathBuf {
    reviews_root(repo_root).join(date.format("%Y-%m-%d").to_string())
}

pub fn session_file(session_dir: &Path) -> PathBuf {
    session_dir.join(SESSION_FILE)
}

pub fn lock_file(session_dir: &Path) -> PathBuf {
    session_dir.join(LOCK_FILE)
}

/// Temp file used while replacing `_session.json`; unique per lock owner.
pub fn session_temp_file(session_dir: &Path, owner: &str) -> PathBuf {
    session_dir.join(format!("{SESSION_FILE}.tmp.{owner}"))
}

pub fn config_file(repo_root: &Path) -> PathBuf {
    reviews_root(repo_root).join(CONFIG_FILE)
}

/// Walk up from `start` to the first directory containing `.git`.
pub fn discover_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Make a target reference safe for use inside a file name.
///
/// Keeps ASCII alphanumerics and `.`, `-`, `_`; anything else becomes `_`. Leading and
/// trailing underscores are trimmed, an empty result becomes `ref`, and the output is capped
/// at 64 bytes.
pub fn sanitize_ref(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches('_');
    let mut out = if trimmed.is_empty() {
        "ref".to_string()
    } else {
        trimmed.to_string()
    };
    // Only ASCII survives the mapping above, so truncating on a byte index is safe.
    out.truncate(MAX_REF_LEN);
    out
}

/// Parse a `YYYY-MM-DD` session date.
pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date '{}' (expected YYYY-MM-DD): {}", raw, e))
}
