//! Read-only session views and explicit initialization - `revsync session`.

use anyhow::Result;
use console::style;

use revsync::query::{self, ReportFilters, ReportListing, ReportQuery, ReviewSummary};
use revsync::session::SessionDocument;

use super::context::{self, SessionContext};
use super::output::{or_dash, print_json};
use crate::{ListArgs, SessionCommands};

pub fn cmd_session(command: SessionCommands, json: bool) -> Result<()> {
    match command {
        SessionCommands::Show { session } => {
            let ctx = SessionContext::resolve(&session)?;
            let doc = query::show_session(&ctx.store())?;
            if json {
                print_json(&doc)?;
            } else {
                print_document(&doc);
            }
        }
        SessionCommands::ListReports(args) => {
            let ctx = SessionContext::resolve(&args.session)?;
            let listing = query::list_reports(&ctx.store(), &report_query(&args))?;
            if json {
                print_json(&listing)?;
            } else {
                print_listing(&listing);
            }
        }
        SessionCommands::Init { session, lock } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(lock.max_retries);
            let owner = context::lock_owner(&lock)?;
            let store = ctx.store();
            let existed = store.load()?.is_some();
            let doc = store.ensure_exists(&ctx.seed(), &owner)?;
            if json {
                print_json(&serde_json::json!({
                    "created": !existed,
                    "session_dir": store.dir(),
                    "session_file": store.file(),
                    "schema_version": doc.schema_version,
                }))?;
            } else if existed {
                println!("Session already exists: {}", store.file().display());
            } else {
                println!(
                    "{} Created {}",
                    style("✓").green(),
                    store.file().display()
                );
            }
        }
    }
    Ok(())
}

fn report_query(args: &ListArgs) -> ReportQuery {
    ReportQuery {
        view: args.view,
        filters: ReportFilters {
            statuses: args.statuses.clone(),
            phases: args.phases.clone(),
            verdicts: args.verdicts.clone(),
            initiator_statuses: args.initiator_statuses.clone(),
            target_ref: args.target_ref.clone(),
            session_id: args.session_id.clone(),
            reviewer_id: args.reviewer_id.clone(),
            only_with_report: args.only_with_report,
            only_with_notes: args.only_with_notes,
        },
        sort: args.sort,
        descending: args.desc,
        verbose: args.verbose_entries,
    }
}

fn print_document(doc: &SessionDocument) {
    println!();
    println!("Session {}", style(doc.session_date).bold());
    println!("  schema_version: {}", doc.schema_version);
    println!("  repo_root:      {}", doc.repo_root);
    println!("  reviewers:      {}", doc.reviewers.join(", "));
    println!();
    if doc.reviews.is_empty() {
        println!("No reviews registered.");
        return;
    }
    for entry in &doc.reviews {
        println!(
            "{} {} {} {}",
            style(&entry.reviewer_id).cyan(),
            style(&entry.session_id).dim(),
            entry.target_ref,
            status_label(entry.status.as_str(), entry.status.is_terminal())
        );
        println!(
            "  phase: {}  verdict: {}  counts: {}  initiator: {}",
            or_dash(entry.current_phase),
            or_dash(entry.verdict),
            entry.counts,
            entry.initiator_status
        );
        if let Some(report) = &entry.report_file {
            println!("  report: {}", report);
        }
        for note in &entry.notes {
            println!(
                "  [{}] {} {}: {}",
                note.timestamp.format("%H:%M:%S"),
                note.role,
                note.note_type,
                note.content
            );
        }
    }
    println!();
}

fn print_listing(listing: &ReportListing) {
    println!(
        "{} of {} reviews in {}",
        listing.matching_reviews,
        listing.total_reviews,
        listing.session_dir.display()
    );
    if listing.reviews.is_empty() {
        return;
    }
    println!();
    println!(
        "{:<10} {:<10} {:<24} {:<12} {:<18} {:<16} {:<12} {}",
        "REVIEWER", "SESSION", "TARGET", "STATUS", "PHASE", "VERDICT", "COUNTS", "INITIATOR"
    );
    for review in &listing.reviews {
        print_summary(review, listing.query.verbose);
    }
}

fn print_summary(review: &ReviewSummary, verbose: bool) {
    println!(
        "{:<10} {:<10} {:<24} {:<12} {:<18} {:<16} {:<12} {}",
        review.reviewer_id,
        review.session_id,
        review.target_ref,
        review.status.as_str(),
        or_dash(review.current_phase),
        or_dash(review.verdict),
        review.counts.to_string(),
        review.initiator_status
    );
    if !verbose {
        return;
    }
    if let Some(path) = &review.report_path {
        println!("  report: {}", path.display());
    }
    if let Some(err) = &review.report_error {
        println!("  {} {}", style("report unreadable:").yellow(), err);
    }
    if let Some(notes) = &review.notes {
        for note in notes {
            println!("  note {} {}: {}", note.role, note.note_type, note.content);
        }
    }
    if let Some(text) = &review.report_contents {
        println!();
        for line in text.lines() {
            println!("    {}", line);
        }
        println!();
    }
}

fn status_label(status: &str, terminal: bool) -> String {
    if terminal {
        style(status).green().to_string()
    } else {
        style(status).yellow().to_string()
    }
}
