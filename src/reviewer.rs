//! Reviewer side of the protocol: register, update, note, finalize.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::errors::CoordError;
use crate::id;
use crate::report;
use crate::session::{
    InitiatorStatus, Note, ReviewEntry, ReviewPhase, ReviewerStatus, Role, SessionDocument,
    SessionSeed, SessionStore, SeverityCounts, Verdict,
};

/// Arguments to [`ReviewerCoordinator::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub target_ref: String,
    pub reviewer_id: Option<String>,
    pub session_id: Option<String>,
    pub parent_id: Option<String>,
}

/// Identity context returned by registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub reviewer_id: String,
    pub session_id: String,
    pub target_ref: String,
    pub parent_id: Option<String>,
    /// False when an existing entry was returned.
    pub created: bool,
    pub session_dir: PathBuf,
    pub session_file: PathBuf,
}

/// Arguments to [`ReviewerCoordinator::finalize`].
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub verdict: Verdict,
    pub counts: SeverityCounts,
    pub report_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finalized {
    pub reviewer_id: String,
    pub session_id: String,
    pub verdict: Verdict,
    pub counts: SeverityCounts,
    pub report_file: String,
    pub report_path: PathBuf,
}

/// Performs reviewer-role mutations on one session.
#[derive(Debug, Clone)]
pub struct ReviewerCoordinator {
    store: SessionStore,
    lock_owner: String,
}

impl ReviewerCoordinator {
    pub fn new(store: SessionStore, lock_owner: impl Into<String>) -> Self {
        Self {
            store,
            lock_owner: lock_owner.into(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Register a reviewer against `target_ref`, creating the session if needed.
    ///
    /// Re-registering the same `(reviewer_id, target_ref)` returns the existing entry. Without
    /// an explicit session id a new reviewer joins an open review of the same target.
    pub fn register(
        &self,
        seed: &SessionSeed,
        request: &RegisterRequest,
    ) -> Result<Registration, CoordError> {
        let target_ref = request.target_ref.trim();
        if target_ref.is_empty() {
            return Err(CoordError::InvalidIdentifier {
                label: "target_ref".to_string(),
                value: request.target_ref.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        for (label, value) in [
            ("reviewer_id", &request.reviewer_id),
            ("session_id", &request.session_id),
            ("parent_id", &request.parent_id),
        ] {
            if let Some(value) = value {
                id::validate(label, value)?;
            }
        }

        let reviewer_id = match &request.reviewer_id {
            Some(rid) => rid.clone(),
            None => id::random_id8()?,
        };
        let fresh_session_id = id::random_id8()?;

        let (session_id, parent_id, created) = self.store.mutate_or_create(
            seed,
            &self.lock_owner,
            Role::Reviewer,
            |doc| {
                if let Some(existing) =
                    existing_registration(doc, &reviewer_id, target_ref, request)?
                {
                    return Ok(existing);
                }

                let session_id = match &request.session_id {
                    Some(explicit) => explicit.clone(),
                    None => joinable_session(doc, target_ref).unwrap_or(fresh_session_id),
                };
                if let Some(entry) = doc.find(&reviewer_id, &session_id) {
                    return Err(CoordError::TargetMismatch {
                        reviewer_id: reviewer_id.clone(),
                        session_id,
                        existing: entry.target_ref.clone(),
                        requested: target_ref.to_string(),
                    });
                }

                let initiator_status = doc
                    .reviews
                    .iter()
                    .rev()
                    .find(|e| e.session_id == session_id && e.target_ref == target_ref)
                    .map(|e| e.initiator_status)
                    .unwrap_or(InitiatorStatus::Requesting);

                doc.reviews.push(ReviewEntry::new(
                    reviewer_id.clone(),
                    session_id.clone(),
                    target_ref,
                    request.parent_id.clone(),
                    initiator_status,
                ));
                if !doc.reviewers.contains(&reviewer_id) {
                    doc.reviewers.push(reviewer_id.clone());
                }
                Ok((session_id, request.parent_id.clone(), true))
            },
        )?;

        if created {
            info!(%reviewer_id, %session_id, target_ref, "registered reviewer");
        }
        Ok(Registration {
            reviewer_id,
            session_id,
            target_ref: target_ref.to_string(),
            parent_id,
            created,
            session_dir: self.store.dir().to_path_buf(),
            session_file: self.store.file(),
        })
    }

    /// Move an entry to a new status and/or phase. `Some(None)` clears the phase.
    ///
    /// Status changes are refused once the entry is terminal; phase-only updates are not.
    pub fn update(
        &self,
        reviewer_id: &str,
        session_id: &str,
        status: Option<ReviewerStatus>,
        phase: Option<Option<ReviewPhase>>,
    ) -> Result<ReviewEntry, CoordError> {
        if status.is_none() && phase.is_none() {
            return Err(CoordError::Other(anyhow::anyhow!(
                "nothing to update: pass a status and/or a phase"
            )));
        }
        self.store
            .mutate(&self.lock_owner, Role::Reviewer, |doc| {
                // A terminal status is final, but the phase hint stays writable.
                let entry = match status {
                    Some(_) => open_entry(doc, reviewer_id, session_id, "update")?,
                    None => doc.entry_mut(reviewer_id, session_id)?,
                };
                let now = Utc::now();
                if let Some(next) = status {
                    entry.status.check_transition(next)?;
                    entry.status = next;
                    if next.is_terminal() {
                        entry.finished_at = Some(now);
                    }
                }
                if let Some(phase) = phase {
                    entry.current_phase = phase;
                }
                entry.updated_at = now;
                Ok(entry.clone())
            })
    }

    /// Append a reviewer note.
    pub fn note(
        &self,
        reviewer_id: &str,
        session_id: &str,
        note_type: &str,
        content: Value,
    ) -> Result<Note, CoordError> {
        let note = Note::new(Role::Reviewer, note_type, content);
        self.store
            .mutate(&self.lock_owner, Role::Reviewer, |doc| {
                let entry = doc.entry_mut(reviewer_id, session_id)?;
                entry.updated_at = note.timestamp;
                entry.notes.push(note.clone());
                Ok(())
            })?;
        Ok(note)
    }

    /// Record the verdict and counts and write the report. Only once per entry.
    pub fn finalize(
        &self,
        reviewer_id: &str,
        session_id: &str,
        request: &FinalizeRequest,
    ) -> Result<Finalized, CoordError> {
        let mut written: Option<PathBuf> = None;
        let result = self
            .store
            .mutate(&self.lock_owner, Role::Reviewer, |doc| {
                let session_dir = self.store.dir();
                let entry = open_entry(doc, reviewer_id, session_id, "finalize")?;
                let preferred =
                    report::report_file_name(entry.started_at, &entry.target_ref, reviewer_id);
                let (file_name, path) =
                    report::write_report_unique(session_dir, &preferred, &request.report_text)?;
                written = Some(path.clone());

                let now = Utc::now();
                entry.status = ReviewerStatus::Finished;
                entry.current_phase = Some(ReviewPhase::ReportWriting);
                entry.verdict = Some(request.verdict);
                entry.counts = request.counts;
                entry.report_file = Some(file_name.clone());
                entry.updated_at = now;
                entry.finished_at = Some(now);

                Ok(Finalized {
                    reviewer_id: reviewer_id.to_string(),
                    session_id: session_id.to_string(),
                    verdict: request.verdict,
                    counts: request.counts,
                    report_file: file_name,
                    report_path: path,
                })
            });

        match result {
            Ok(done) => {
                info!(
                    reviewer_id,
                    session_id,
                    verdict = %done.verdict,
                    counts = %done.counts,
                    "finalized review"
                );
                Ok(done)
            }
            Err(e) => {
                if let Some(orphan) = written
                    && let Err(rm) = fs::remove_file(&orphan)
                {
                    warn!(path = %orphan.display(), "could not remove orphaned report: {rm}");
                }
                Err(e)
            }
        }
    }
}

/// An entry that can still be changed by its reviewer.
fn open_entry<'a>(
    doc: &'a mut SessionDocument,
    reviewer_id: &str,
    session_id: &str,
    action: &str,
) -> Result<&'a mut ReviewEntry, CoordError> {
    let entry = doc.entry_mut(reviewer_id, session_id)?;
    if entry.status.is_terminal() {
        return Err(CoordError::AlreadyTerminal {
            reviewer_id: reviewer_id.to_string(),
            session_id: session_id.to_string(),
            status: entry.status.to_string(),
            action: action.to_string(),
        });
    }
    Ok(entry)
}

type ExistingRegistration = (String, Option<String>, bool);

fn existing_registration(
    doc: &SessionDocument,
    reviewer_id: &str,
    target_ref: &str,
    request: &RegisterRequest,
) -> Result<Option<ExistingRegistration>, CoordError> {
    let found = |entry: &ReviewEntry| {
        Some((entry.session_id.clone(), entry.parent_id.clone(), false))
    };

    if let Some(session_id) = &request.session_id {
        return match doc.find(reviewer_id, session_id) {
            Some(entry) if entry.target_ref == target_ref => Ok(found(entry)),
            Some(entry) => Err(CoordError::TargetMismatch {
                reviewer_id: reviewer_id.to_string(),
                session_id: session_id.clone(),
                existing: entry.target_ref.clone(),
                requested: target_ref.to_string(),
            }),
            None => Ok(None),
        };
    }

    let mut matching = doc
        .reviews
        .iter()
        .filter(|e| e.reviewer_id == reviewer_id && e.target_ref == target_ref);
    let preferred = matching
        .clone()
        .rev()
        .find(|e| !e.status.is_terminal())
        .or_else(|| matching.next_back());
    Ok(preferred.and_then(found))
}

/// Session id of the most recent open review of `target_ref`, if any.
fn joinable_session(doc: &SessionDocument, target_ref: &str) -> Option<String> {
    doc.reviews
        .iter()
        .rev()
        .find(|e| e.target_ref == target_ref && !e.status.is_terminal())
        .map(|e| e.session_id.clone())
}
