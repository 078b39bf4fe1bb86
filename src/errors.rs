//! Typed error hierarchy for review session coordination.
//!
//! Every failure a coordinated operation can produce is a [`CoordError`]. Variants are grouped
//! into an [`ErrorCategory`] which decides the process exit status of the CLI:
//! - contention: the session lock could not be taken (or belongs to someone else)
//! - not-found: the targeted session or review entry does not exist
//! - schema: the session document is from an incompatible version or is malformed
//! - state: the operation violates a state machine or role ownership rule
//! - io: the filesystem failed underneath us

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`CoordError`], used for exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Contention,
    NotFound,
    Schema,
    State,
    Io,
}

impl ErrorCategory {
    /// Process exit status for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Usage => 1,
            ErrorCategory::Contention => 3,
            ErrorCategory::NotFound => 4,
            ErrorCategory::Schema => 5,
            ErrorCategory::State => 6,
            ErrorCategory::Io => 7,
        }
    }
}

/// Errors from the session coordination subsystem.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("LOCK_TIMEOUT: {} is held by {} after {attempts} attempts{}", .path.display(), .holder.as_deref().unwrap_or("an unknown owner"), stale_hint(.age_secs, .stale))]
    LockContention {
        path: PathBuf,
        holder: Option<String>,
        attempts: usize,
        age_secs: Option<i64>,
        stale: bool,
    },

    #[error("lock {} is owned by {holder}, not {caller}; refusing to remove it", .path.display())]
    LockHeldByOther {
        path: PathBuf,
        holder: String,
        caller: String,
    },

    #[error("no session file at {}", .path.display())]
    SessionNotFound { path: PathBuf },

    #[error("review entry not found for reviewer_id={reviewer_id} session_id={session_id}")]
    EntryNotFound {
        reviewer_id: String,
        session_id: String,
    },

    #[error("unsupported schema_version {found} in {} (this build writes {expected})", .path.display())]
    SchemaMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("malformed session file {}: {reason}", .path.display())]
    MalformedSession { path: PathBuf, reason: String },

    #[error("review {reviewer_id}/{session_id} is already {status}; refusing to {action}")]
    AlreadyTerminal {
        reviewer_id: String,
        session_id: String,
        status: String,
        action: String,
    },

    #[error("invalid {field} transition {from} -> {to}: {reason}")]
    InvalidTransition {
        field: String,
        from: String,
        to: String,
        reason: String,
    },

    #[error("{role} may not modify {field}")]
    RoleViolation { role: String, field: String },

    #[error(
        "review entry {reviewer_id}/{session_id} already exists for target_ref {existing}, not {requested}"
    )]
    TargetMismatch {
        reviewer_id: String,
        session_id: String,
        existing: String,
        requested: String,
    },

    #[error("invalid {label} {value:?}: {reason}")]
    InvalidIdentifier {
        label: String,
        value: String,
        reason: String,
    },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn stale_hint(age_secs: &Option<i64>, stale: &bool) -> String {
    match (*age_secs, *stale) {
        (Some(age), true) => format!(" (lock is {age}s old and looks stale; see `revsync lock break`)"),
        (Some(age), false) => format!(" (lock is {age}s old)"),
        (None, _) => String::new(),
    }
}

impl CoordError {
    /// Wrap an I/O failure together with the path and the action that failed.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoordError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn entry_not_found(reviewer_id: &str, session_id: &str) -> Self {
        CoordError::EntryNotFound {
            reviewer_id: reviewer_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CoordError::LockContention { .. } | CoordError::LockHeldByOther { .. } => {
                ErrorCategory::Contention
            }
            CoordError::SessionNotFound { .. } | CoordError::EntryNotFound { .. } => {
                ErrorCategory::NotFound
            }
            CoordError::SchemaMismatch { .. } | CoordError::MalformedSession { .. } => {
                ErrorCategory::Schema
            }
            CoordError::AlreadyTerminal { .. }
            | CoordError::InvalidTransition { .. }
            | CoordError::RoleViolation { .. }
            | CoordError::TargetMismatch { .. } => ErrorCategory::State,
            CoordError::Io { .. } => ErrorCategory::Io,
            CoordError::InvalidIdentifier { .. } | CoordError::Other(_) => ErrorCategory::Usage,
        }
    }
}

/// Pick the exit status for an arbitrary error chain.
///
/// The first [`CoordError`] found in the chain decides; anything else is a usage error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CoordError>())
        .map(|coord| coord.category().exit_code())
        .unwrap_or_else(|| ErrorCategory::Usage.exit_code())
}
