//! Report files written by finalize.
//!
//! Each finalized review gets one markdown file in the session directory named
//! `{HH-MM-SS-mmm}_{target_ref}_{reviewer_id}.md`, timed from the entry's `started_at`.
//! Files are created once and never rewritten.

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::CoordError;
use crate::paths::sanitize_ref;

/// File name for a review's report.
pub fn report_file_name(started_at: DateTime<Utc>, target_ref: &str, reviewer_id: &str) -> String {
    format!(
        "{}_{}_{}.md",
        started_at.format("%H-%M-%S-%3f"),
        sanitize_ref(target_ref),
        reviewer_id
    )
}

/// Write `text` to `session_dir/file_name`, failing if the file already exists.
///
/// A trailing newline is added when missing. Returns the full path.
pub fn write_report(session_dir: &Path, file_name: &str, text: &str) -> Result<PathBuf, CoordError> {
    let path = session_dir.join(file_name);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| CoordError::io("create report file", &path, e))?;

    let mut body = text.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    let written = file
        .write_all(body.as_bytes())
        .and_then(|_| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&path);
        return Err(CoordError::io("write report file", &path, e));
    }
    info!(path = %path.display(), bytes = body.len(), "wrote review report");
    Ok(path)
}

/// Highest `-N` suffix tried by [`write_report_unique`].
pub const MAX_REPORT_SUFFIX: u32 = 99;

/// Like [`write_report`], but when `file_name` is taken (for example by a finalize that crashed
/// before committing the session) tries `{stem}-2.md`, `{stem}-3.md` and so on.
///
/// Existing files are never touched. Returns the file name used and its full path.
pub fn write_report_unique(
    session_dir: &Path,
    file_name: &str,
    text: &str,
) -> Result<(String, PathBuf), CoordError> {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    let mut candidate = file_name.to_string();
    let mut suffix = 1;
    loop {
        match write_report(session_dir, &candidate, text) {
            Ok(path) => return Ok((candidate, path)),
            Err(CoordError::Io { source, path, .. })
                if source.kind() == ErrorKind::AlreadyExists && suffix < MAX_REPORT_SUFFIX =>
            {
                warn!(path = %path.display(), "report file already exists, picking another name");
                suffix += 1;
                candidate = format!("{stem}-{suffix}.md");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Resolve a stored `report_file` value to a path.
///
/// A bare file name lives in the session directory; a relative path with several components
/// is taken relative to the repository root; absolute paths are used as they are.
pub fn resolve_report_path(repo_root: &Path, session_dir: &Path, report_file: &str) -> PathBuf {
    let stored = Path::new(report_file);
    if stored.is_absolute() {
        stored.to_path_buf()
    } else if stored.components().count() > 1 {
        repo_root.join(stored)
    } else {
        session_dir.join(stored)
    }
}

pub fn read_report(path: &Path) -> Result<String, CoordError> {
    fs::read_to_string(path).map_err(|e| CoordError::io("read report file", path, e))
}
