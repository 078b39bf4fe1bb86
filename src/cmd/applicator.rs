//! Applicator-side commands - `revsync applicator`.

use anyhow::Result;
use console::style;
use std::time::Instant;

use revsync::applicator::{
    self, ApplicatorCoordinator, WaitEnd, WaitOptions, WaitOutcome, WaitScope,
};

use super::context::{self, SessionContext};
use super::output::{or_dash, print_json, print_ok};
use super::reviewer::note_content;
use crate::ApplicatorCommands;

pub async fn cmd_applicator(command: ApplicatorCommands, json: bool) -> Result<()> {
    match command {
        ApplicatorCommands::Wait {
            target_ref,
            session_id,
            poll_ms,
            timeout_secs,
            session,
        } => {
            let mut ctx = SessionContext::resolve(&session)?;
            ctx.config.override_poll_interval_ms(poll_ms);
            ctx.config.override_timeout_secs(timeout_secs);
            let options = WaitOptions {
                poll_interval: ctx.config.settings.poll_interval(),
                timeout: ctx.config.settings.wait_timeout(),
                scope: WaitScope {
                    target_ref,
                    session_id,
                },
            };
            let outcome = wait(&ctx, &options).await?;
            if json {
                print_json(&outcome)?;
            } else {
                print_outcome(&outcome);
            }
        }
        ApplicatorCommands::SetStatus {
            entry,
            initiator_status,
            session,
            lock,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator =
                ApplicatorCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
            let previous =
                coordinator.set_status(&entry.reviewer_id, &entry.session_id, initiator_status)?;
            if json {
                print_json(&serde_json::json!({
                    "reviewer_id": entry.reviewer_id,
                    "session_id": entry.session_id,
                    "previous": previous,
                    "initiator_status": initiator_status,
                }))?;
            } else {
                print_ok();
            }
        }
        ApplicatorCommands::Note {
            entry,
            note,
            session,
            lock,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let coordinator =
                ApplicatorCoordinator::new(ctx.store(), context::lock_owner(&lock)?);
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
    }
    Ok(())
}

/// Poll until done, timed out or interrupted with Ctrl-C.
async fn wait(ctx: &SessionContext, options: &WaitOptions) -> Result<WaitOutcome> {
    let store = ctx.store();
    let started = Instant::now();
    let outcome = tokio::select! {
        result = applicator::wait_for_reviews(&store, options) => result?,
        Ok(()) = tokio::signal::ctrl_c() => {
            let snap = applicator::snapshot(&store, &options.scope)?;
            WaitOutcome {
                complete: false,
                end: WaitEnd::Interrupted,
                waited_ms: started.elapsed().as_millis() as u64,
                polls: 0,
                watched: snap.watched,
                pending: snap.pending,
            }
        }
    };
    Ok(outcome)
}

fn print_outcome(outcome: &WaitOutcome) {
    match outcome.end {
        WaitEnd::Complete => println!(
            "{} {} review(s) complete",
            style("✓").green(),
            outcome.watched
        ),
        WaitEnd::TimedOut => println!(
            "{} Timed out after {}ms; {} of {} review(s) pending",
            style("!").yellow(),
            outcome.waited_ms,
            outcome.pending.len(),
            outcome.watched
        ),
        WaitEnd::Interrupted => println!(
            "{} Interrupted; {} of {} review(s) pending",
            style("!").yellow(),
            outcome.pending.len(),
            outcome.watched
        ),
    }
    for pending in &outcome.pending {
        println!(
            "  {} {} {} {} {}",
            style(&pending.reviewer_id).cyan(),
            pending.session_id,
            pending.target_ref,
            pending.status,
            or_dash(pending.current_phase)
        );
    }
}
