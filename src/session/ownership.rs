//! Field ownership rules between the reviewer and applicator roles.
//!
//! [`check`] compares the document as loaded with the document after a mutation and rejects
//! any change the acting role is not entitled to make:
//!
//! | Field(s)                                                   | Writer            |
//! |------------------------------------------------------------|-------------------|
//! | `schema_version`, `session_date`, `repo_root`              | nobody            |
//! | entry identity (`reviewer_id`, `session_id`, `target_ref`, `parent_id`, `started_at`) | nobody |
//! | `status`, `current_phase`, `verdict`, `counts`, `report_file`, `updated_at`, `finished_at` | reviewer |
//! | `initiator_status`                                         | applicator        |
//! | new entries, new `reviewers` ids                           | reviewer          |
//! | `notes`                                                    | append-only, tagged with the acting role |

use serde_json::{Map, Value};

use super::model::{ReviewEntry, Role, SessionDocument};
use crate::errors::CoordError;

fn violation(role: Role, field: impl Into<String>) -> CoordError {
    CoordError::RoleViolation {
        role: role.to_string(),
        field: field.into(),
    }
}

fn frozen<T: PartialEq>(role: Role, field: &str, before: &T, after: &T) -> Result<(), CoordError> {
    if before == after {
        Ok(())
    } else {
        Err(violation(role, field))
    }
}

fn owned_by<T: PartialEq>(
    owner: Role,
    role: Role,
    field: &str,
    before: &T,
    after: &T,
) -> Result<(), CoordError> {
    if role == owner {
        Ok(())
    } else {
        frozen(role, field, before, after)
    }
}

/// Verify that turning `before` into `after` only touches fields owned by `role`.
pub fn check(role: Role, before: &SessionDocument, after: &SessionDocument) -> Result<(), CoordError> {
    frozen(role, "schema_version", &before.schema_version, &after.schema_version)?;
    frozen(role, "session_date", &before.session_date, &after.session_date)?;
    frozen(role, "repo_root", &before.repo_root, &after.repo_root)?;
    frozen::<Map<String, Value>>(role, "session fields", &before.extra, &after.extra)?;

    if !after.reviewers.starts_with(&before.reviewers) {
        return Err(violation(role, "reviewers"));
    }
    if after.reviewers.len() > before.reviewers.len() && role != Role::Reviewer {
        return Err(violation(role, "reviewers"));
    }

    if after.reviews.len() < before.reviews.len() {
        return Err(violation(role, "reviews"));
    }
    for (old, new) in before.reviews.iter().zip(&after.reviews) {
        check_entry(role, old, new)?;
    }

    let added = &after.reviews[before.reviews.len()..];
    if !added.is_empty() && role != Role::Reviewer {
        return Err(violation(role, "reviews"));
    }
    for entry in added {
        if !after.reviewers.contains(&entry.reviewer_id) {
            return Err(violation(role, "reviewers"));
        }
        if entry.notes.iter().any(|n| n.role != role) {
            return Err(violation(role, "notes"));
        }
    }
    Ok(())
}

fn check_entry(role: Role, old: &ReviewEntry, new: &ReviewEntry) -> Result<(), CoordError> {
    frozen(role, "reviewer_id", &old.reviewer_id, &new.reviewer_id)?;
    frozen(role, "session_id", &old.session_id, &new.session_id)?;
    frozen(role, "target_ref", &old.target_ref, &new.target_ref)?;
    frozen(role, "parent_id", &old.parent_id, &new.parent_id)?;
    frozen(role, "started_at", &old.started_at, &new.started_at)?;
    frozen(role, "entry fields", &old.extra, &new.extra)?;

    let reviewer = Role::Reviewer;
    owned_by(reviewer, role, "status", &old.status, &new.status)?;
    owned_by(reviewer, role, "current_phase", &old.current_phase, &new.current_phase)?;
    owned_by(reviewer, role, "verdict", &old.verdict, &new.verdict)?;
    owned_by(reviewer, role, "counts", &old.counts, &new.counts)?;
    owned_by(reviewer, role, "report_file", &old.report_file, &new.report_file)?;
    owned_by(reviewer, role, "updated_at", &old.updated_at, &new.updated_at)?;
    owned_by(reviewer, role, "finished_at", &old.finished_at, &new.finished_at)?;
    owned_by(
        Role::Applicator,
        role,
        "initiator_status",
        &old.initiator_status,
        &new.initiator_status,
    )?;

    if !new.notes.starts_with(&old.notes) {
        return Err(violation(role, "notes"));
    }
    if new.notes[old.notes.len()..].iter().any(|n| n.role != role) {
        return Err(violation(role, "notes"));
    }
    Ok(())
}
