//! Session document types.
//!
//! A [`SessionDocument`] is the JSON object stored in `_session.json`. Enum values are
//! serialized in `SCREAMING_SNAKE_CASE` (`IN_PROGRESS`, `REQUEST_CHANGES`, ...), note roles in
//! lowercase. Fields this build does not know about are kept in `extra` maps and written back
//! unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::errors::CoordError;

/// Schema version written by this build.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Major component of a `major.minor.patch` version string.
pub fn schema_major(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

/// Which actor is performing a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reviewer,
    Applicator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reviewer => "reviewer",
            Self::Applicator => "applicator",
        };
        write!(f, "{}", s)
    }
}

/// Reviewer-owned lifecycle status of a review entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerStatus {
    Initializing,
    InProgress,
    Finished,
    Cancelled,
    Error,
    Blocked,
}

impl ReviewerStatus {
    /// `FINISHED`, `CANCELLED` and `ERROR` end a review.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Check a status change requested through `update`.
    ///
    /// `FINISHED` is only reachable through finalize, and nothing leaves a terminal status.
    /// Re-stating the current status is allowed.
    pub fn check_transition(self, to: Self) -> Result<(), CoordError> {
        use ReviewerStatus::*;

        let reason = match (self, to) {
            (from, _) if from.is_terminal() => Some("the review has already ended"),
            (_, Finished) => Some("a review can only become FINISHED through finalize"),
            (from, to) if from == to => None,
            (_, Initializing) => Some("INITIALIZING is only valid for a new entry"),
            (Initializing | Blocked, InProgress) => None,
            (Initializing | InProgress, Blocked) => None,
            (_, Cancelled | Error) => None,
            _ => Some("transition not allowed"),
        };
        match reason {
            Some(reason) => Err(CoordError::InvalidTransition {
                field: "status".to_string(),
                from: self.to_string(),
                to: to.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ReviewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Applicator-owned progress on a review entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitiatorStatus {
    Requesting,
    Observing,
    Received,
    Reviewed,
    Applying,
    Applied,
    Cancelled,
}

impl InitiatorStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requesting => "REQUESTING",
            Self::Observing => "OBSERVING",
            Self::Received => "RECEIVED",
            Self::Reviewed => "REVIEWED",
            Self::Applying => "APPLYING",
            Self::Applied => "APPLIED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Position along `REQUESTING -> ... -> APPLIED`. `CANCELLED` is off the line.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Requesting => Some(0),
            Self::Observing => Some(1),
            Self::Received => Some(2),
            Self::Reviewed => Some(3),
            Self::Applying => Some(4),
            Self::Applied => Some(5),
            Self::Cancelled => None,
        }
    }

    /// Moves go forward (skipping is fine) or to `CANCELLED`; terminal values are final.
    pub fn check_transition(self, to: Self) -> Result<(), CoordError> {
        if self == to {
            return Ok(());
        }
        let reason = if self.is_terminal() {
            Some("initiator status is already final")
        } else {
            match (self.rank(), to.rank()) {
                (_, None) => None,
                (Some(from), Some(next)) if next > from => None,
                _ => Some("initiator status only moves forward"),
            }
        };
        match reason {
            Some(reason) => Err(CoordError::InvalidTransition {
                field: "initiator_status".to_string(),
                from: self.to_string(),
                to: to.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for InitiatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress hint for a running review. Never validated for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPhase {
    Ingestion,
    DomainCoverage,
    TheoremGeneration,
    AdversarialProofs,
    Synthesis,
    ReportWriting,
}

impl ReviewPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "INGESTION",
            Self::DomainCoverage => "DOMAIN_COVERAGE",
            Self::TheoremGeneration => "THEOREM_GENERATION",
            Self::AdversarialProofs => "ADVERSARIAL_PROOFS",
            Self::Synthesis => "SYNTHESIS",
            Self::ReportWriting => "REPORT_WRITING",
        }
    }
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final verdict recorded by finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// No changes required.
    Approve,
    /// Changes required before merge.
    RequestChanges,
    /// Cannot merge.
    Block,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::RequestChanges => "REQUEST_CHANGES",
            Self::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Finding counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub blocker: u64,
    #[serde(default)]
    pub major: u64,
    #[serde(default)]
    pub minor: u64,
    #[serde(default)]
    pub nit: u64,
}

impl SeverityCounts {
    pub fn new(blocker: u64, major: u64, minor: u64, nit: u64) -> Self {
        Self {
            blocker,
            major,
            minor,
            nit,
        }
    }

    pub fn total(&self) -> u64 {
        self.blocker + self.major + self.minor + self.nit
    }
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "B{}/M{}/m{}/n{}",
            self.blocker, self.major, self.minor, self.nit
        )
    }
}

/// Append-only message attached to a review entry.
///
/// `note_type` is free-form. Conventional values are `escalation_trigger`,
/// `domain_observation`, `blocker_preview`, `question`, `handoff` and `error_detail` from
/// reviewers, and `applied`, `declined`, `deferred`, `clarification_needed`,
/// `already_addressed` and `acknowledged` from the applicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub note_type: String,
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    pub fn new(role: Role, note_type: impl Into<String>, content: Value) -> Self {
        Self {
            role,
            timestamp: Utc::now(),
            note_type: note_type.into(),
            content,
            extra: Map::new(),
        }
    }
}

/// One reviewer's record of reviewing one target reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub reviewer_id: String,
    pub session_id: String,
    pub target_ref: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub initiator_status: InitiatorStatus,
    pub status: ReviewerStatus,
    #[serde(default)]
    pub current_phase: Option<ReviewPhase>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub counts: SeverityCounts,
    #[serde(default)]
    pub report_file: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReviewEntry {
    /// A freshly registered entry in `INITIALIZING`.
    pub fn new(
        reviewer_id: impl Into<String>,
        session_id: impl Into<String>,
        target_ref: impl Into<String>,
        parent_id: Option<String>,
        initiator_status: InitiatorStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            reviewer_id: reviewer_id.into(),
            session_id: session_id.into(),
            target_ref: target_ref.into(),
            parent_id,
            initiator_status,
            status: ReviewerStatus::Initializing,
            current_phase: None,
            verdict: None,
            counts: SeverityCounts::default(),
            report_file: None,
            started_at: now,
            updated_at: now,
            finished_at: None,
            notes: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_identified_by(&self, reviewer_id: &str, session_id: &str) -> bool {
        self.reviewer_id == reviewer_id && self.session_id == session_id
    }
}

/// The contents of `_session.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub schema_version: String,
    pub session_date: NaiveDate,
    pub repo_root: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<ReviewEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionDocument {
    pub fn new(repo_root: impl Into<String>, session_date: NaiveDate) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            session_date,
            repo_root: repo_root.into(),
            reviewers: Vec::new(),
            reviews: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn find(&self, reviewer_id: &str, session_id: &str) -> Option<&ReviewEntry> {
        self.reviews
            .iter()
            .find(|e| e.is_identified_by(reviewer_id, session_id))
    }

    pub fn find_mut(&mut self, reviewer_id: &str, session_id: &str) -> Option<&mut ReviewEntry> {
        self.reviews
            .iter_mut()
            .find(|e| e.is_identified_by(reviewer_id, session_id))
    }

    /// Like [`find_mut`](Self::find_mut) but a missing entry is an error.
    pub fn entry_mut(
        &mut self,
        reviewer_id: &str,
        session_id: &str,
    ) -> Result<&mut ReviewEntry, CoordError> {
        self.find_mut(reviewer_id, session_id)
            .ok_or_else(|| CoordError::entry_not_found(reviewer_id, session_id))
    }

    /// Parse and validate raw `_session.json` bytes read from `path`.
    ///
    /// The schema version is checked before the shape so that a document from an incompatible
    /// release is reported as such rather than as malformed.
    pub fn from_json(raw: &str, path: &Path) -> Result<Self, CoordError> {
        let malformed = |reason: String| CoordError::MalformedSession {
            path: path.to_path_buf(),
            reason,
        };

        let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
        let version = value
            .get("schema_version")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing string field schema_version".to_string()))?;
        if schema_major(version) != schema_major(SCHEMA_VERSION) {
            return Err(CoordError::SchemaMismatch {
                path: path.to_path_buf(),
                found: version.to_string(),
                expected: SCHEMA_VERSION.to_string(),
            });
        }

        let doc: SessionDocument =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
        doc.validate().map_err(malformed)?;
        Ok(doc)
    }

    /// Structural checks that serde alone does not cover.
    pub fn validate(&self) -> Result<(), String> {
        let mut pairs = HashSet::new();
        for entry in &self.reviews {
            if !pairs.insert((entry.reviewer_id.as_str(), entry.session_id.as_str())) {
                return Err(format!(
                    "duplicate review entry for reviewer_id={} session_id={}",
                    entry.reviewer_id, entry.session_id
                ));
            }
            if !self.reviewers.contains(&entry.reviewer_id) {
                return Err(format!(
                    "reviewer_id {} has a review entry but is missing from reviewers",
                    entry.reviewer_id
                ));
            }
        }
        Ok(())
    }
}
