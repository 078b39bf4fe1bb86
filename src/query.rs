//! Read-only views over a session. Nothing here takes the session lock.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::CoordError;
use crate::report;
use crate::session::{
    InitiatorStatus, Note, ReviewEntry, ReviewPhase, ReviewerStatus, SessionDocument,
    SessionStore, SeverityCounts, Verdict,
};

/// Preset status filter for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportsView {
    /// Every entry.
    #[default]
    All,
    /// Not yet terminal (`INITIALIZING`, `IN_PROGRESS`, `BLOCKED`).
    Open,
    /// Terminal (`FINISHED`, `CANCELLED`, `ERROR`).
    Closed,
    /// `IN_PROGRESS` only.
    InProgress,
}

impl ReportsView {
    fn admits(self, status: ReviewerStatus) -> bool {
        match self {
            Self::All => true,
            Self::Open => !status.is_terminal(),
            Self::Closed => status.is_terminal(),
            Self::InProgress => status == ReviewerStatus::InProgress,
        }
    }
}

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Registration,
    Started,
    Updated,
    Finished,
}

/// Entry filters. Each set is "any of"; an empty set does not filter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportFilters {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<ReviewerStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<ReviewPhase>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<Verdict>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub initiator_statuses: Vec<InitiatorStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    pub only_with_report: bool,
    pub only_with_notes: bool,
}

fn any_of<T: PartialEq>(allowed: &[T], value: Option<&T>) -> bool {
    allowed.is_empty() || value.is_some_and(|v| allowed.contains(v))
}

fn equals(wanted: &Option<String>, actual: &str) -> bool {
    wanted.as_deref().is_none_or(|w| w == actual)
}

impl ReportFilters {
    pub fn matches(&self, entry: &ReviewEntry) -> bool {
        any_of(&self.statuses, Some(&entry.status))
            && any_of(&self.phases, entry.current_phase.as_ref())
            && any_of(&self.verdicts, entry.verdict.as_ref())
            && any_of(&self.initiator_statuses, Some(&entry.initiator_status))
            && equals(&self.target_ref, &entry.target_ref)
            && equals(&self.session_id, &entry.session_id)
            && equals(&self.reviewer_id, &entry.reviewer_id)
            && (!self.only_with_report || entry.report_file.is_some())
            && (!self.only_with_notes || !entry.notes.is_empty())
    }
}

/// Everything that shapes a listing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportQuery {
    pub view: ReportsView,
    pub filters: ReportFilters,
    pub sort: SortKey,
    pub descending: bool,
    /// Inline notes and report file contents.
    pub verbose: bool,
}

/// One entry as shown in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub reviewer_id: String,
    pub session_id: String,
    pub target_ref: String,
    pub parent_id: Option<String>,
    pub initiator_status: InitiatorStatus,
    pub status: ReviewerStatus,
    pub current_phase: Option<ReviewPhase>,
    pub verdict: Option<Verdict>,
    pub counts: SeverityCounts,
    pub report_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
}

impl ReviewSummary {
    fn build(entry: &ReviewEntry, repo_root: &Path, session_dir: &Path, verbose: bool) -> Self {
        let report_path = entry
            .report_file
            .as_deref()
            .map(|file| report::resolve_report_path(repo_root, session_dir, file));

        let (report_contents, report_error) = match (&report_path, verbose) {
            (Some(path), true) => match report::read_report(path) {
                Ok(text) => (Some(text), None),
                Err(e) => {
                    warn!(reviewer_id = %entry.reviewer_id, "{e}");
                    (None, Some(e.to_string()))
                }
            },
            _ => (None, None),
        };

        Self {
            reviewer_id: entry.reviewer_id.clone(),
            session_id: entry.session_id.clone(),
            target_ref: entry.target_ref.clone(),
            parent_id: entry.parent_id.clone(),
            initiator_status: entry.initiator_status,
            status: entry.status,
            current_phase: entry.current_phase,
            verdict: entry.verdict,
            counts: entry.counts,
            report_file: entry.report_file.clone(),
            report_path,
            report_contents,
            report_error,
            started_at: entry.started_at,
            updated_at: entry.updated_at,
            finished_at: entry.finished_at,
            notes_count: entry.notes.len(),
            notes: verbose.then(|| entry.notes.clone()),
        }
    }
}

/// Result of [`list_reports`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportListing {
    pub session_dir: PathBuf,
    pub session_file: PathBuf,
    pub query: ReportQuery,
    pub total_reviews: usize,
    pub matching_reviews: usize,
    pub reviews: Vec<ReviewSummary>,
}

/// The whole session document.
pub fn show_session(store: &SessionStore) -> Result<SessionDocument, CoordError> {
    store.load_required()
}

/// Filtered, sorted projection of the session's entries.
pub fn list_reports(store: &SessionStore, query: &ReportQuery) -> Result<ReportListing, CoordError> {
    let doc = store.load_required()?;
    Ok(collect(&doc, store.dir(), query, store.file()))
}

fn sort_value(entry: &ReviewEntry, key: SortKey) -> Option<DateTime<Utc>> {
    match key {
        SortKey::Registration => None,
        SortKey::Started => Some(entry.started_at),
        SortKey::Updated => Some(entry.updated_at),
        SortKey::Finished => entry.finished_at,
    }
}

fn collect(
    doc: &SessionDocument,
    session_dir: &Path,
    query: &ReportQuery,
    session_file: PathBuf,
) -> ReportListing {
    let mut selected: Vec<&ReviewEntry> = doc
        .reviews
        .iter()
        .filter(|e| query.view.admits(e.status) && query.filters.matches(e))
        .collect();

    // Stable sort keeps registration order among ties in both directions.
    // Entries without a value (unfinished, for `finished`) sort last either way.
    match query.sort {
        SortKey::Registration if query.descending => selected.reverse(),
        SortKey::Registration => {}
        key => selected.sort_by(|a, b| {
            match (sort_value(a, key), sort_value(b, key)) {
                (Some(x), Some(y)) if query.descending => y.cmp(&x),
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }),
    }

    let repo_root = Path::new(&doc.repo_root);
    let reviews: Vec<ReviewSummary> = selected
        .into_iter()
        .map(|e| ReviewSummary::build(e, repo_root, session_dir, query.verbose))
        .collect();

    ReportListing {
        session_dir: session_dir.to_path_buf(),
        session_file,
        query: query.clone(),
        total_reviews: doc.reviews.len(),
        matching_reviews: reviews.len(),
        reviews,
    }
}
