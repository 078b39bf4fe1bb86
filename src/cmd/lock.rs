//! Manual lock operations - `revsync lock`.
//!
//! Normal commands take and drop the lock themselves; these exist for scripts that need to
//! hold it across several steps and for clearing a lock left behind by a crashed process.

use anyhow::{Context, Result};
use console::style;

use revsync::lock::{self, ReleaseOutcome};

use super::context::SessionContext;
use super::output::{or_dash, print_json};
use crate::LockCommands;

pub fn cmd_lock(command: LockCommands, json: bool) -> Result<()> {
    match command {
        LockCommands::Acquire {
            session,
            owner,
            max_retries,
        } => {
            let ctx = SessionContext::resolve(&session)?.with_max_retries(max_retries);
            std::fs::create_dir_all(&ctx.session_dir).with_context(|| {
                format!("Failed to create {}", ctx.session_dir.display())
            })?;
            let cfg = ctx.config.settings.lock_config();
            let guard = lock::acquire(&ctx.session_dir, &owner, &cfg)?;
            let reentrant = guard.is_reentrant();
            // The lock outlives this process; `lock release` removes it.
            guard.persist();
            if json {
                print_json(&serde_json::json!({
                    "acquired": true,
                    "owner": owner,
                    "already_held": reentrant,
                    "path": revsync::paths::lock_file(&ctx.session_dir),
                }))?;
            } else if reentrant {
                println!("Lock already held by {}", style(&owner).cyan());
            } else {
                println!("Lock acquired by {}", style(&owner).cyan());
            }
        }
        LockCommands::Release { session, owner } => {
            let ctx = SessionContext::resolve(&session)?;
            let outcome = lock::release(&ctx.session_dir, &owner)?;
            if json {
                print_json(&serde_json::json!({ "outcome": outcome, "owner": owner }))?;
            } else {
                match outcome {
                    ReleaseOutcome::Released => println!("Lock released"),
                    ReleaseOutcome::NotHeld => println!("Lock was not held"),
                }
            }
        }
        LockCommands::Status { session } => {
            let ctx = SessionContext::resolve(&session)?;
            let info = lock::inspect(&ctx.session_dir, &ctx.config.settings.lock_config())?;
            if json {
                print_json(&serde_json::json!({ "locked": info.is_some(), "lock": info }))?;
            } else {
                match info {
                    None => println!("Unlocked"),
                    Some(info) => {
                        let state = if info.stale {
                            style("stale").yellow().to_string()
                        } else {
                            style("held").green().to_string()
                        };
                        println!("Lock {}", state);
                        println!("  owner:       {}", or_dash(info.owner.as_deref()));
                        println!("  pid:         {}", or_dash(info.pid));
                        println!(
                            "  acquired_at: {}",
                            or_dash(info.acquired_at.map(|t| t.to_rfc3339()))
                        );
                        println!("  age:         {}s", or_dash(info.age_secs));
                        println!("  path:        {}", info.path.display());
                    }
                }
            }
        }
        LockCommands::Break { session, force } => {
            let ctx = SessionContext::resolve(&session)?;
            let removed =
                lock::break_lock(&ctx.session_dir, &ctx.config.settings.lock_config(), force)?;
            if json {
                print_json(&serde_json::json!({ "broken": removed.is_some(), "lock": removed }))?;
            } else {
                match removed {
                    Some(info) => println!(
                        "Removed lock held by {}",
                        or_dash(info.owner.as_deref())
                    ),
                    None => println!("Unlocked"),
                }
            }
        }
    }
    Ok(())
}
