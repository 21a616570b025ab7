//! Domain types for voxbrief.
//!
//! This module contains the core data structures:
//! - Note: captured audio/text and its processing status
//! - ExtractionResult: insights derived from one note
//! - SessionSummary / DailySummary: aggregates
//! - RefreshEvent: log of tier runs

pub mod events;
pub mod insights;
pub mod note;
pub mod summary;

// Re-export commonly used types
pub use events::{RefreshEvent, RefreshOutcome, Tier};
pub use insights::{ExtractionResult, InsightItem, InsightKind};
pub use note::{AudioRef, Note, NoteStatus};
pub use summary::{DailySummary, DigestBody, SessionSummary};
