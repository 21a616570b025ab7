//! Command-line interface for voxbrief.
//!
//! Provides commands for recording notes, triggering the session and daily
//! tiers, importing audio from the inbox, and inspecting refresh state.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::api::OpenAiClient;
use crate::config;
use crate::domain::{DailySummary, SessionSummary};
use crate::ingest::{ImportOutcome, InboxWatcher};
use crate::refresh::{Backends, DailyCheck, RefreshCoordinator};
use crate::store::{JournalStore, NoteRepository};

pub mod note;

/// voxbrief - Voice note enrichment with tiered refresh
#[derive(Parser, Debug)]
#[command(name = "voxbrief")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record, list and inspect notes
    Note {
        #[command(subcommand)]
        command: note::NoteCommands,
    },

    /// Simulate the app coming to the foreground (session + daily check)
    Foreground,

    /// Show the session summary
    Session {
        /// Recompute even if the cached summary is still valid
        #[arg(short, long)]
        force: bool,
    },

    /// Generate or show the daily brief
    Daily {
        /// Local date the brief is for (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Regenerate even if a brief exists for the date
        #[arg(short, long)]
        force: bool,
    },

    /// Import audio files from the inbox directory
    Inbox {
        #[command(subcommand)]
        command: InboxCommands,
    },

    /// Show refresh state, usage counters and recent refreshes
    Status {
        /// Number of recent refresh events to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show current configuration and paths
    Config,
}

/// Inbox subcommands
#[derive(Subcommand, Debug)]
pub enum InboxCommands {
    /// Import files currently in the inbox and exit
    Scan,

    /// Watch the inbox until interrupted
    Watch,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Note { command } => note::execute(command).await,
            Commands::Foreground => foreground().await,
            Commands::Session { force } => session(force).await,
            Commands::Daily { date, force } => daily(date, force).await,
            Commands::Inbox { command } => inbox(command).await,
            Commands::Status { limit } => show_status(limit).await,
            Commands::Config => show_config(),
        }
    }
}

/// Open the journal under the configured home
pub(crate) async fn open_store() -> Result<Arc<JournalStore>> {
    Ok(Arc::new(JournalStore::open_default().await?))
}

/// Build a coordinator over the journal and the configured API
pub(crate) async fn open_coordinator() -> Result<Arc<RefreshCoordinator>> {
    let cfg = config::config()?;
    if cfg.api.api_key.is_none() {
        tracing::warn!("No API key configured (VOXBRIEF_API_KEY or OPENAI_API_KEY)");
    }

    let repo: Arc<dyn NoteRepository> = open_store().await?;
    let client = OpenAiClient::new(&cfg.api)?;
    let coordinator =
        RefreshCoordinator::load(repo, Backends::from_client(client), cfg.refresh).await?;

    Ok(Arc::new(coordinator))
}

async fn foreground() -> Result<()> {
    let coordinator = open_coordinator().await?;
    let outcome = coordinator.on_app_foregrounded(Utc::now()).await?;

    print_session(&outcome.session, outcome.session_refreshed);
    println!();
    match outcome.daily {
        DailyCheck::Generated(summary) => print_daily(&summary),
        DailyCheck::AlreadyDone(date) => println!("Daily brief for {} already generated", date),
        DailyCheck::Failed { date, error } => {
            eprintln!("Daily brief for {} failed: {}", date, error);
            eprintln!("It will be retried on the next foreground.");
        }
    }

    Ok(())
}

async fn session(force: bool) -> Result<()> {
    let coordinator = open_coordinator().await?;
    let (summary, refreshed) = coordinator.session_summary(Utc::now(), force).await?;
    print_session(&summary, refreshed);
    Ok(())
}

async fn daily(date: Option<NaiveDate>, force: bool) -> Result<()> {
    let coordinator = open_coordinator().await?;
    let date = date.unwrap_or_else(|| coordinator.local_date(Utc::now()));

    if force {
        let summary = coordinator.force_daily_brief(date).await?;
        print_daily(&summary);
        return Ok(());
    }

    match coordinator.check_daily_brief(date).await? {
        DailyCheck::Generated(summary) => print_daily(&summary),
        DailyCheck::AlreadyDone(date) => {
            match coordinator.repository().daily_summary(date).await? {
                Some(summary) => print_daily(&summary),
                None => println!("Daily brief for {} already generated", date),
            }
        }
        DailyCheck::Failed { date, error } => {
            anyhow::bail!("Daily brief for {} failed: {}", date, error)
        }
    }

    Ok(())
}

async fn inbox(command: InboxCommands) -> Result<()> {
    let cfg = config::config()?;
    tokio::fs::create_dir_all(&cfg.inbox.path)
        .await
        .with_context(|| format!("Cannot create inbox {}", cfg.inbox.path.display()))?;

    let coordinator = open_coordinator().await?;
    let watcher = InboxWatcher::new(cfg.inbox.clone(), coordinator);

    match command {
        InboxCommands::Scan => {
            let result = watcher.scan_once().await?;
            println!("Scanned {} files:", result.total_scanned());
            println!("  Imported:   {}", result.imported);
            println!("  Failed:     {}", result.failed);
            println!("  Duplicates: {}", result.duplicates);
            println!("  Errors:     {}", result.errors);
        }
        InboxCommands::Watch => {
            let scan = watcher.scan_once().await?;
            println!(
                "Imported {} existing files, watching {} (Ctrl-C to stop)",
                scan.imported,
                cfg.inbox.path.display()
            );

            let (mut events, handle) = watcher.watch()?;
            loop {
                tokio::select! {
                    Some(outcome) = events.recv() => match outcome {
                        ImportOutcome::Imported(id) => println!("Imported note {}", id),
                        ImportOutcome::Failed { note_id, error } => {
                            eprintln!("Note {} not enriched: {}", note_id, error)
                        }
                        ImportOutcome::Duplicate(hash) => println!("Skipped duplicate {}", hash),
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.stop().await?;
        }
    }

    Ok(())
}

async fn show_status(limit: usize) -> Result<()> {
    let cfg = config::config()?;
    let store = open_store().await?;
    let snapshot = store.load_snapshot().await?;
    let refresh = &snapshot.refresh;
    let counters = &snapshot.counters;

    println!("Refresh state:");
    println!(
        "  Last session refresh: {}",
        refresh
            .last_session_refresh
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  Last daily brief:     {}",
        refresh
            .last_daily_brief_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Session window:       {} min", cfg.refresh.session_window_minutes);
    println!();
    println!("Usage:");
    println!("  Notes recorded:     {}", counters.notes_recorded);
    println!("  Transcriptions:     {}", counters.transcriptions);
    println!("  Transcribed audio:  {:.0}s", counters.transcribed_seconds);
    println!("  Extractions:        {}", counters.extractions);
    println!("  Daily briefs:       {}", counters.daily_briefs);
    println!("  Session refreshes:  {}", counters.session_refreshes);
    println!("  Failures:           {}", counters.failures);

    let events = store.recent_events(limit).await?;
    if !events.is_empty() {
        println!();
        println!("{:<20} {:<8} {:<10} {:<38}", "TIME", "TIER", "OUTCOME", "SUBJECT");
        println!("{}", "-".repeat(78));
        for event in events {
            println!(
                "{:<20} {:<8} {:<10} {:<38}",
                event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                event.tier.to_string(),
                format!("{:?}", event.outcome),
                event.subject
            );
            if let Some(error) = event.error {
                println!("  {}", truncate(&error, 74));
            }
        }
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("voxbrief configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Journal: {}", cfg.journal_path().display());
    println!("  Inbox:   {}", cfg.inbox.path.display());
    println!();
    println!("API:");
    println!("  Base URL:       {}", cfg.api.base_url);
    println!("  API key:        {}", if cfg.api.api_key.is_some() { "set" } else { "(not set)" });
    println!("  Transcription:  {}", cfg.api.transcription_model);
    println!("  Extraction:     {}", cfg.api.extraction_model);
    println!("  Digest:         {}", cfg.api.digest_model);
    println!("  Timeout:        {}s", cfg.api.timeout_seconds);
    println!("  Max chunk:      {} bytes / {}s", cfg.api.chunking.max_bytes, cfg.api.chunking.max_chunk_secs);
    println!();
    println!("Refresh:");
    println!("  Session window: {} min", cfg.refresh.session_window_minutes);
    println!("  Calendar:       {}", cfg.refresh.calendar_label());
    println!();
    println!("Inbox:");
    println!("  Extensions:     {}", cfg.inbox.extensions.join(", "));
    println!("  Stable after:   {}s", cfg.inbox.stability_delay_secs);

    Ok(())
}

fn print_session(summary: &SessionSummary, refreshed: bool) {
    println!(
        "Session ({} to {}){}",
        summary.window_start.format("%m-%d %H:%M"),
        summary.window_end.format("%m-%d %H:%M"),
        if refreshed { "" } else { " [cached]" }
    );
    println!(
        "  Notes: {} ({} extracted, {} pending, {} failed)",
        summary.note_count, summary.extracted_count, summary.pending_count, summary.failed_count
    );
    println!(
        "  Insights: {} decisions, {} actions, {} commitments, {} unresolved",
        summary.decision_count,
        summary.action_count,
        summary.commitment_count,
        summary.unresolved_count
    );

    if !summary.recent_actions.is_empty() {
        println!("  Recent actions:");
        for action in &summary.recent_actions {
            println!("    - {}", action.render());
        }
    }
    for id in &summary.failed_notes {
        println!("  Needs retry: {}", id);
    }
}

fn print_daily(summary: &DailySummary) {
    println!(
        "Daily brief for {} ({} notes, {})",
        summary.date, summary.note_count, summary.model
    );
    println!();
    println!("{}", summary.digest.summary);

    if !summary.digest.highlights.is_empty() {
        println!("\nHighlights:");
        for h in &summary.digest.highlights {
            println!("  - {}", h);
        }
    }
    if !summary.digest.open_loops.is_empty() {
        println!("\nOpen loops:");
        for l in &summary.digest.open_loops {
            println!("  - {}", l);
        }
    }
}

/// Truncate to `max` characters with an ellipsis
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let kept: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        line.to_string()
    }
}
