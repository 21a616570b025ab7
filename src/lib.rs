//! voxbrief - Voice note enrichment with tiered refresh
//!
//! Turns voice notes into transcripts, structured insights and a daily brief
//! while keeping remote model calls to a minimum.
//!
//! # Tiers
//!
//! - **Per note**: one transcription call (audio only) and one extraction
//!   call when a note is saved
//! - **Per session**: a local summary of recent notes, valid for a
//!   configurable 15-60 minute window
//! - **Per day**: one digest call per local calendar date, covering the
//!   previous day's notes
//!
//! State is kept in an append-only JSONL journal and derived by replay.
//!
//! # Modules
//!
//! - `api`: remote transcription, extraction and digest clients
//! - `audio`: duration probing and decoding for chunked uploads
//! - `domain`: notes, insights, summaries and refresh events
//! - `refresh`: freshness policies and the refresh coordinator
//! - `store`: repositories (journal, in-memory)
//! - `ingest`: inbox directory watcher
//! - `config`: configuration loading
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Record a note
//! voxbrief note add --audio standup.m4a
//!
//! # Session summary and daily check
//! voxbrief foreground
//!
//! # Import dropped recordings
//! voxbrief inbox watch
//! ```

pub mod api;
pub mod audio;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod refresh;
pub mod store;

// Re-export main types at crate root for convenience
pub use api::{ApiError, OpenAiClient};
pub use domain::{DailySummary, ExtractionResult, Note, NoteStatus, SessionSummary};
pub use refresh::{Backends, DailyCheck, RefreshCoordinator, RefreshError, RefreshSnapshot};
pub use store::{JournalStore, MemoryStore, NoteRepository};
