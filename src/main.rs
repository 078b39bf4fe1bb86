use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use revsync::errors::exit_code_for;
use revsync::query::{ReportsView, SortKey};
use revsync::session::{InitiatorStatus, ReviewPhase, ReviewerStatus, Verdict};

mod cmd;

#[derive(Parser)]
#[command(name = "revsync")]
#[command(
    version,
    about = "Coordinate concurrent code reviewers and a feedback applicator through a shared session file",
    after_long_help = r#"Session directory layout (relative to the repository root):
  .local/reports/code_reviews/YYYY-MM-DD/
    _session.json
    _session.json.lock
    {HH-MM-SS-mmm}_{ref}_{reviewer_id}.md

Exit codes:
  0 success   1 usage   3 lock contention   4 not found
  5 schema    6 state   7 I/O

Common flows:
  # Reviewer
  eval "$(revsync reviewer register --target-ref main --emit-env sh)"
  revsync reviewer update --status IN_PROGRESS --phase INGESTION
  revsync reviewer finalize --verdict APPROVE --nit 1 --report-file review.md

  # Applicator
  revsync applicator wait --timeout-secs 600
  revsync applicator set-status --reviewer-id <id> --session-id <id> --initiator-status RECEIVED
"#
)]
pub struct Cli {
    /// Debug logging on stderr (REVSYNC_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as pretty JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Locates the session directory.
#[derive(Args, Clone, Debug, Default)]
pub struct SessionArgs {
    /// Repository root (default: enclosing git checkout, else the current directory)
    #[arg(long, value_name = "DIR", env = "REVSYNC_REPO_ROOT")]
    pub repo_root: Option<PathBuf>,

    /// Session date (default: today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD", env = "REVSYNC_DATE")]
    pub date: Option<String>,

    /// Session directory to use instead of the one derived from repo root and date
    #[arg(long, value_name = "DIR", env = "REVSYNC_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,
}

/// Lock options for commands that modify the session.
#[derive(Args, Clone, Debug, Default)]
pub struct LockArgs {
    /// Lock owner token (default: a fresh random id for this invocation)
    #[arg(long, value_name = "OWNER")]
    pub lock_owner: Option<String>,

    /// Lock retries after the first attempt (overrides revsync.toml)
    #[arg(long, value_name = "N")]
    pub max_retries: Option<usize>,
}

/// Identifies the caller's own review entry.
#[derive(Args, Clone, Debug)]
pub struct ReviewerEntryArgs {
    #[arg(long, value_name = "ID", env = "REVSYNC_REVIEWER_ID")]
    pub reviewer_id: String,

    #[arg(long, value_name = "ID", env = "REVSYNC_SESSION_ID")]
    pub session_id: String,
}

/// Identifies a reviewer's entry from the applicator side.
#[derive(Args, Clone, Debug)]
pub struct EntryArgs {
    #[arg(long, value_name = "ID")]
    pub reviewer_id: String,

    #[arg(long, value_name = "ID")]
    pub session_id: String,
}

/// Note payload.
#[derive(Args, Clone, Debug)]
pub struct NoteArgs {
    /// Note type, e.g. question, handoff, applied, declined (free-form)
    #[arg(long = "type", value_name = "TYPE")]
    pub note_type: String,

    /// Note content
    #[arg(long)]
    pub content: String,

    /// Parse --content as JSON instead of storing it as a string
    #[arg(long)]
    pub content_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate random hex identifiers
    Id {
        #[command(subcommand)]
        command: IdCommands,
    },
    /// Inspect or operate the session lock by hand
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Read session state without modifying it
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Reviewer operations (register, update, note, finalize)
    Reviewer {
        #[command(subcommand)]
        command: ReviewerCommands,
    },
    /// Applicator operations (wait, set-status, note)
    Applicator {
        #[command(subcommand)]
        command: ApplicatorCommands,
    },
    /// View or validate configuration
    Config {
        /// Repository root whose revsync.toml to use
        #[arg(long, value_name = "DIR", env = "REVSYNC_REPO_ROOT")]
        repo_root: Option<PathBuf>,

        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum IdCommands {
    /// 8 hex characters (4 random bytes)
    Id8,
    /// 2*N hex characters
    Hex {
        /// Number of random bytes
        #[arg(long, value_name = "N", default_value_t = 4)]
        bytes: usize,
    },
}

#[derive(Subcommand)]
pub enum LockCommands {
    /// Take the lock and leave it held after exiting
    Acquire {
        #[command(flatten)]
        session: SessionArgs,
        /// Owner token recorded in the lock file
        #[arg(long)]
        owner: String,
        /// Retries after the first attempt (overrides revsync.toml)
        #[arg(long, value_name = "N")]
        max_retries: Option<usize>,
    },
    /// Release a lock held by OWNER (no-op if unlocked)
    Release {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        owner: String,
    },
    /// Show who holds the lock and for how long
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Remove a stale lock
    Break {
        #[command(flatten)]
        session: SessionArgs,
        /// Remove the lock even if it is not stale
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Print the whole session document
    Show {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// List review entries with filters
    #[command(visible_alias = "list")]
    ListReports(ListArgs),
    /// Create the session directory and file if missing
    Init {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Preset status selection
    #[arg(long, value_enum, default_value_t = ReportsView::All)]
    pub view: ReportsView,

    /// Reviewer status (repeatable or comma-separated)
    #[arg(long = "status", value_enum, value_delimiter = ',', ignore_case = true)]
    pub statuses: Vec<ReviewerStatus>,

    /// Current phase (repeatable or comma-separated)
    #[arg(long = "phase", value_enum, value_delimiter = ',', ignore_case = true)]
    pub phases: Vec<ReviewPhase>,

    /// Verdict (repeatable or comma-separated)
    #[arg(long = "verdict", value_enum, value_delimiter = ',', ignore_case = true)]
    pub verdicts: Vec<Verdict>,

    /// Initiator status (repeatable or comma-separated)
    #[arg(long = "initiator-status", value_enum, value_delimiter = ',', ignore_case = true)]
    pub initiator_statuses: Vec<InitiatorStatus>,

    #[arg(long, value_name = "REF")]
    pub target_ref: Option<String>,

    #[arg(long, value_name = "ID")]
    pub session_id: Option<String>,

    #[arg(long, value_name = "ID")]
    pub reviewer_id: Option<String>,

    /// Only entries with a report file
    #[arg(long)]
    pub only_with_report: bool,

    /// Only entries with at least one note
    #[arg(long)]
    pub only_with_notes: bool,

    #[arg(long, value_enum, default_value_t = SortKey::Registration)]
    pub sort: SortKey,

    /// Reverse the order
    #[arg(long)]
    pub desc: bool,

    /// Include notes and report file contents
    #[arg(long)]
    pub verbose_entries: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EmitEnvFormat {
    /// `export KEY='value'` lines for POSIX shells
    Sh,
}

#[derive(Subcommand)]
pub enum ReviewerCommands {
    /// Register against a target reference (creates or joins the day's session)
    Register {
        /// Branch, PR ref, commit or worktree state under review
        #[arg(long, value_name = "REF")]
        target_ref: String,

        /// Reviewer id (default: random)
        #[arg(long, value_name = "ID", env = "REVSYNC_REVIEWER_ID")]
        reviewer_id: Option<String>,

        /// Session id (default: join an open review of the same target, else random)
        #[arg(long, value_name = "ID")]
        session_id: Option<String>,

        /// Reviewer this one was spawned by
        #[arg(long, value_name = "ID")]
        parent_id: Option<String>,

        /// Print the session context as shell exports
        #[arg(long, value_enum)]
        emit_env: Option<EmitEnvFormat>,

        /// Print the session context as KEY=value lines
        #[arg(long, conflicts_with = "emit_env")]
        print_env: bool,

        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
    /// Change your status and/or phase
    Update {
        #[command(flatten)]
        entry: ReviewerEntryArgs,

        #[arg(long, value_enum, ignore_case = true)]
        status: Option<ReviewerStatus>,

        #[arg(long, value_enum, ignore_case = true)]
        phase: Option<ReviewPhase>,

        /// Unset the current phase
        #[arg(long, conflicts_with = "phase")]
        clear_phase: bool,

        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
    /// Append a reviewer note
    Note {
        #[command(flatten)]
        entry: ReviewerEntryArgs,
        #[command(flatten)]
        note: NoteArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
    /// Record the verdict and counts and store the report (once)
    Finalize {
        #[command(flatten)]
        entry: ReviewerEntryArgs,

        #[arg(long, value_enum, ignore_case = true)]
        verdict: Verdict,

        #[arg(long, default_value_t = 0)]
        blocker: u64,
        #[arg(long, default_value_t = 0)]
        major: u64,
        #[arg(long, default_value_t = 0)]
        minor: u64,
        #[arg(long, default_value_t = 0)]
        nit: u64,

        /// Markdown report to store (default: read from stdin)
        #[arg(long, value_name = "PATH")]
        report_file: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
}

#[derive(Subcommand)]
pub enum ApplicatorCommands {
    /// Block until reviews reach FINISHED, CANCELLED or ERROR
    Wait {
        /// Only wait for entries reviewing this target
        #[arg(long, value_name = "REF")]
        target_ref: Option<String>,

        /// Only wait for entries in this session id
        #[arg(long, value_name = "ID")]
        session_id: Option<String>,

        /// Pause between polls (overrides revsync.toml)
        #[arg(long, value_name = "MS")]
        poll_ms: Option<u64>,

        /// Give up after this long and report what is pending (overrides revsync.toml)
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        #[command(flatten)]
        session: SessionArgs,
    },
    /// Set initiator_status on one review entry
    SetStatus {
        #[command(flatten)]
        entry: EntryArgs,

        #[arg(long, value_enum, ignore_case = true)]
        initiator_status: InitiatorStatus,

        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
    /// Append an applicator note
    Note {
        #[command(flatten)]
        entry: EntryArgs,
        #[command(flatten)]
        note: NoteArgs,
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        lock: LockArgs,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show effective settings and where each came from
    Show,
    /// Write a default revsync.toml
    Init,
    /// Check revsync.toml for problems
    Validate,
}

fn init_tracing(verbose: bool) {
    let filter = match std::env::var("REVSYNC_LOG") {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
        _ if verbose => EnvFilter::new("revsync=debug"),
        _ => EnvFilter::new("warn"),
    };
    let json_logs = std::env::var("REVSYNC_LOG_JSON").unwrap_or_default() == "1";
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Id { command } => cmd::cmd_id(command, json)?,
        Commands::Lock { command } => cmd::cmd_lock(command, json)?,
        Commands::Session { command } => cmd::cmd_session(command, json)?,
        Commands::Reviewer { command } => cmd::cmd_reviewer(command, json)?,
        Commands::Applicator { command } => cmd::cmd_applicator(command, json).await?,
        Commands::Config { repo_root, command } => {
            cmd::cmd_config(repo_root.as_deref(), command, json)?
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), err);
        std::process::exit(exit_code_for(&err));
    }
}
