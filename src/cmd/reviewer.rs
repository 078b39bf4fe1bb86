//! Reviewer-side commands - `revsync reviewer`.

use anyhow::{Context, Result, bail};
use console::style;
use serde_json::Value;
use std::io::Read;

use revsync::reviewer::{FinalizeRequest, RegisterRequest, Registration, ReviewerCoordinator};
use revsync::session::SeverityCounts;

use super::context::{self, SessionContext};
use super::output::{print_json, print_ok};
use crate::{EmitEnvFormat, NoteArgs, ReviewerCommands};

pub fn cmd_reviewer(command: ReviewerCommands, json: bool) -> Result<()> {
    match command {
        ReviewerCommands::Register {
            target_ref,
            reviewer_id,
            session_id,
            parent_id,
            emit_env,
            print_env,
            session,
            lock,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator = ReviewerCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
            let request = RegisterRequest {
                target_ref,
                reviewer_id,
                session_id,
                parent_id,
            };
            let registration = coordinator.register(&ctx.seed(), &request)?;
            let vars = env_vars(&ctx, &registration);

            if let Some(EmitEnvFormat::Sh) = emit_env {
                for (key, value) in &vars {
                    println!("export {}={}", key, shell_quote(value));
                }
            } else if print_env {
                for (key, value) in &vars {
                    println!("{}={}", key, value);
                }
            } else if json {
                print_json(&registration)?;
            } else {
                let verb = if registration.created {
                    "Registered"
                } else {
                    "Already registered"
                };
                println!(
                    "{} {} for {}",
                    verb,
                    style(&registration.reviewer_id).cyan(),
                    style(&registration.target_ref).bold()
                );
                println!("  session_id:   {}", registration.session_id);
                println!("  session_file: {}", registration.session_file.display());
            }
        }
        ReviewerCommands::Update {
            entry,
            status,
            phase,
            clear_phase,
            session,
            lock,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator = ReviewerCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
            let phase = if clear_phase { Some(None) } else { phase.map(Some) };
            let updated =
                coordinator.update(&entry.reviewer_id, &entry.session_id, status, phase)?;
            if json {
                print_json(&updated)?;
            } else {
                print_ok();
            }
        }
        ReviewerCommands::Note {
            entry,
            note,
            session,
            lock,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator = ReviewerCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
            let added = coordinator.note(
                &entry.reviewer_id,
                &entry.session_id,
                &note.note_type,
                note_content(&note)?,
            )?;
            if json {
                print_json(&added)?;
            } else {
                print_ok();
            }
        }
        ReviewerCommands::Finalize {
            entry,
            verdict,
            blocker,
            major,
            minor,
            nit,
            report_file,
            session,
            lock,
        } => {
            let report_text = match &report_file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read report: {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    std::io::stdin()
                        .read_to_string(&mut text)
                        .context("Failed to read report from stdin")?;
                    text
                }
            };
            if report_text.trim().is_empty() {
                bail!("Report is empty; pass --report-file or pipe markdown on stdin");
            }

            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator = ReviewerCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
            let request = FinalizeRequest {
                verdict,
                counts: SeverityCounts::new(blocker, major, minor, nit),
                report_text,
            };
            let finalized =
                coordinator.finalize(&entry.reviewer_id, &entry.session_id, &request)?;
            if json {
                print_json(&finalized)?;
            } else {
                println!(
                    "{} {} {} ({})",
                    style("✓").green(),
                    style(&finalized.reviewer_id).cyan(),
                    finalized.verdict,
                    finalized.counts
                );
                println!("  report: {}", finalized.report_path.display());
            }
        }
    }
    Ok(())
}

/// Plain string unless `--content-json` asks for parsing.
pub fn note_content(note: &NoteArgs) -> Result<Value> {
    if note.content_json {
        serde_json::from_str(&note.content).context("--content is not valid JSON")
    } else {
        Ok(Value::String(note.content.clone()))
    }
}

fn env_vars(ctx: &SessionContext, registration: &Registration) -> Vec<(&'static str, String)> {
    vec![
        ("REVSYNC_REPO_ROOT", ctx.repo_root.display().to_string()),
        ("REVSYNC_DATE", ctx.date.format("%Y-%m-%d").to_string()),
        ("REVSYNC_REVIEWER_ID", registration.reviewer_id.clone()),
        ("REVSYNC_SESSION_ID", registration.session_id.clone()),
        (
            "REVSYNC_SESSION_DIR",
            registration.session_dir.display().to_string(),
        ),
        (
            "REVSYNC_SESSION_FILE",
            registration.session_file.display().to_string(),
        ),
        ("REVSYNC_TARGET_REF", registration.target_ref.clone()),
    ]
}

/// Single-quote for POSIX shells.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
