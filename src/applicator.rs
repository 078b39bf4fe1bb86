//! Applicator side of the protocol: initiator status, notes, and waiting for reviewers.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::errors::CoordError;
use crate::session::{
    InitiatorStatus, Note, ReviewEntry, ReviewPhase, ReviewerStatus, Role, SessionStore,
};

/// Shortest pause between polls in [`wait_for_reviews`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Performs applicator-role mutations on one session.
#[derive(Debug, Clone)]
pub struct ApplicatorCoordinator {
    store: SessionStore,
    lock_owner: String,
}

impl ApplicatorCoordinator {
    pub fn new(store: SessionStore, lock_owner: impl Into<String>) -> Self {
        Self {
            store,
            lock_owner: lock_owner.into(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Set `initiator_status` on one existing entry. Returns the previous value.
    pub fn set_status(
        &self,
        reviewer_id: &str,
        session_id: &str,
        status: InitiatorStatus,
    ) -> Result<InitiatorStatus, CoordError> {
        let previous = self
            .store
            .mutate(&self.lock_owner, Role::Applicator, |doc| {
                let entry = doc.entry_mut(reviewer_id, session_id)?;
                let previous = entry.initiator_status;
                previous.check_transition(status)?;
                entry.initiator_status = status;
                Ok(previous)
            })?;
        info!(reviewer_id, session_id, from = %previous, to = %status, "set initiator status");
        Ok(previous)
    }

    /// Append an applicator note.
    pub fn note(
        &self,
        reviewer_id: &str,
        session_id: &str,
        note_type: &str,
        content: Value,
    ) -> Result<Note, CoordError> {
        let note = Note::new(Role::Applicator, note_type, content);
        self.store
            .mutate(&self.lock_owner, Role::Applicator, |doc| {
                doc.entry_mut(reviewer_id, session_id)?
                    .notes
                    .push(note.clone());
                Ok(())
            })?;
        Ok(note)
    }
}

/// Restricts which entries a wait watches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaitScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl WaitScope {
    pub fn is_empty(&self) -> bool {
        self.target_ref.is_none() && self.session_id.is_none()
    }

    fn matches(&self, entry: &ReviewEntry) -> bool {
        self.target_ref
            .as_deref()
            .is_none_or(|t| entry.target_ref == t)
            && self
                .session_id
                .as_deref()
                .is_none_or(|s| entry.session_id == s)
    }
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub scope: WaitScope,
}

/// An entry that has not reached a terminal reviewer status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReview {
    pub reviewer_id: String,
    pub session_id: String,
    pub target_ref: String,
    pub status: ReviewerStatus,
    pub current_phase: Option<ReviewPhase>,
}

impl From<&ReviewEntry> for PendingReview {
    fn from(entry: &ReviewEntry) -> Self {
        Self {
            reviewer_id: entry.reviewer_id.clone(),
            session_id: entry.session_id.clone(),
            target_ref: entry.target_ref.clone(),
            status: entry.status,
            current_phase: entry.current_phase,
        }
    }
}

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitEnd {
    Complete,
    TimedOut,
    Interrupted,
}

/// Result of [`wait_for_reviews`]. A timeout is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct WaitOutcome {
    pub complete: bool,
    pub end: WaitEnd,
    pub waited_ms: u64,
    pub polls: u32,
    /// Entries within scope.
    pub watched: usize,
    pub pending: Vec<PendingReview>,
}

/// One look at the session: how many entries are watched and which are still running.
#[derive(Debug, Clone, Default)]
pub struct WaitSnapshot {
    pub watched: usize,
    pub pending: Vec<PendingReview>,
}

impl WaitSnapshot {
    /// Without a scope an empty session counts as done; with one, something must match first.
    pub fn is_complete(&self, scope: &WaitScope) -> bool {
        self.pending.is_empty() && (scope.is_empty() || self.watched > 0)
    }
}

/// Read the session once. A missing session file is treated as having no entries.
pub fn snapshot(store: &SessionStore, scope: &WaitScope) -> Result<WaitSnapshot, CoordError> {
    let Some(doc) = store.load()? else {
        return Ok(WaitSnapshot::default());
    };
    let watched: Vec<&ReviewEntry> = doc.reviews.iter().filter(|e| scope.matches(e)).collect();
    Ok(WaitSnapshot {
        watched: watched.len(),
        pending: watched
            .into_iter()
            .filter(|e| !e.status.is_terminal())
            .map(PendingReview::from)
            .collect(),
    })
}

/// Poll the session until every watched entry is terminal or `timeout` elapses.
///
/// Never locks. A zero timeout checks exactly once.
pub async fn wait_for_reviews(
    store: &SessionStore,
    options: &WaitOptions,
) -> Result<WaitOutcome, CoordError> {
    let started = Instant::now();
    let poll = options.poll_interval.max(MIN_POLL_INTERVAL);
    let mut polls: u32 = 0;

    loop {
        let snap = snapshot(store, &options.scope)?;
        polls += 1;
        let elapsed = started.elapsed();

        let end = if snap.is_complete(&options.scope) {
            Some(WaitEnd::Complete)
        } else if elapsed >= options.timeout {
            Some(WaitEnd::TimedOut)
        } else {
            None
        };
        if let Some(end) = end {
            info!(?end, polls, pending = snap.pending.len(), "wait finished");
            return Ok(WaitOutcome {
                complete: end == WaitEnd::Complete,
                end,
                waited_ms: elapsed.as_millis() as u64,
                polls,
                watched: snap.watched,
                pending: snap.pending,
            });
        }

        debug!(
            pending = snap.pending.len(),
            watched = snap.watched,
            "reviews still running"
        );
        sleep(poll.min(options.timeout - elapsed)).await;
    }
}
