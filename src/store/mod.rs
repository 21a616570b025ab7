//! Local persistence for notes, insights, summaries and refresh state.
//!
//! The coordinator only sees the [`NoteRepository`] trait. Two
//! implementations ship with the crate:
//! - [`MemoryStore`]: in-process maps (tests, embedding)
//! - [`JournalStore`]: append-only JSONL, state derived from replay

pub mod journal;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{DailySummary, ExtractionResult, Note, RefreshEvent};
use crate::refresh::RefreshSnapshot;

pub use journal::JournalStore;
pub use memory::MemoryStore;

/// Errors that can occur in a repository
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Storage seam used by the refresh coordinator
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert or replace a note
    async fn save_note(&self, note: &Note) -> Result<(), StoreError>;

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError>;

    /// All notes, newest first
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError>;

    async fn save_extraction(&self, extraction: &ExtractionResult) -> Result<(), StoreError>;

    /// Most recent extraction for a note
    async fn latest_extraction(&self, note_id: Uuid) -> Result<Option<ExtractionResult>, StoreError>;

    /// Most recent extraction for each of several notes.
    ///
    /// Notes without an extraction are absent from the map.
    async fn latest_extractions(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ExtractionResult>, StoreError> {
        let mut latest = HashMap::with_capacity(note_ids.len());
        for id in note_ids {
            if let Some(extraction) = self.latest_extraction(*id).await? {
                latest.insert(*id, extraction);
            }
        }
        Ok(latest)
    }

    /// Insert or replace the summary for its date
    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError>;

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError>;

    async fn load_snapshot(&self) -> Result<RefreshSnapshot, StoreError>;

    async fn save_snapshot(&self, snapshot: &RefreshSnapshot) -> Result<(), StoreError>;

    async fn record_event(&self, event: &RefreshEvent) -> Result<(), StoreError>;

    /// Most recent events, newest first
    async fn recent_events(&self, limit: usize) -> Result<Vec<RefreshEvent>, StoreError>;

    /// Notes updated in `[start, end)`, newest first
    async fn notes_updated_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Note>, StoreError> {
        let notes = self.list_notes().await?;
        Ok(notes
            .into_iter()
            .filter(|n| n.updated_at >= start && n.updated_at < end)
            .collect())
    }

    /// Notes created in `[start, end)`, oldest first
    async fn notes_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self
            .list_notes()
            .await?
            .into_iter()
            .filter(|n| n.created_at >= start && n.created_at < end)
            .collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(notes)
    }
}

/// Sort notes newest first (by creation time, id as tie-breaker)
pub(crate) fn sort_newest_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}
