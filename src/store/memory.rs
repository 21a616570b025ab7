//! In-memory repository.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{sort_newest_first, NoteRepository, StoreError};
use crate::domain::{DailySummary, ExtractionResult, Note, RefreshEvent};
use crate::refresh::RefreshSnapshot;

#[derive(Debug, Default)]
struct Inner {
    notes: HashMap<Uuid, Note>,
    extractions: Vec<ExtractionResult>,
    daily: BTreeMap<NaiveDate, DailySummary>,
    snapshot: RefreshSnapshot,
    events: Vec<RefreshEvent>,
}

/// Repository backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored extraction records (all versions)
    pub async fn extraction_count(&self) -> usize {
        self.inner.read().await.extractions.len()
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn save_note(&self, note: &Note) -> Result<(), StoreError> {
        self.inner.write().await.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(self.inner.read().await.notes.get(&id).cloned())
    }

    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.inner.read().await.notes.values().cloned().collect();
        sort_newest_first(&mut notes);
        Ok(notes)
    }

    async fn save_extraction(&self, extraction: &ExtractionResult) -> Result<(), StoreError> {
        self.inner.write().await.extractions.push(extraction.clone());
        Ok(())
    }

    async fn latest_extraction(&self, note_id: Uuid) -> Result<Option<ExtractionResult>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .extractions
            .iter()
            .rev()
            .find(|e| e.note_id == note_id)
            .cloned())
    }

    async fn latest_extractions(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ExtractionResult>, StoreError> {
        let wanted: HashSet<Uuid> = note_ids.iter().copied().collect();
        let inner = self.inner.read().await;
        let mut latest = HashMap::new();
        for extraction in inner.extractions.iter().filter(|e| wanted.contains(&e.note_id)) {
            latest.insert(extraction.note_id, extraction.clone());
        }
        Ok(latest)
    }

    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .daily
            .insert(summary.date, summary.clone());
        Ok(())
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        Ok(self.inner.read().await.daily.get(&date).cloned())
    }

    async fn load_snapshot(&self) -> Result<RefreshSnapshot, StoreError> {
        Ok(self.inner.read().await.snapshot.clone())
    }

    async fn save_snapshot(&self, snapshot: &RefreshSnapshot) -> Result<(), StoreError> {
        self.inner.write().await.snapshot = snapshot.clone();
        Ok(())
    }

    async fn record_event(&self, event: &RefreshEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<RefreshEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_save_replaces_note() {
        let store = MemoryStore::new();
        let mut note = Note::from_text("n", "first");
        store.save_note(&note).await.unwrap();

        note.transcript = Some("second".to_string());
        store.save_note(&note).await.unwrap();

        let notes = store.list_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].transcript.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_window_queries() {
        let store = MemoryStore::new();
        let base = Utc::now();

        for hours in [1, 5, 30] {
            let note = Note::from_text(format!("{}h", hours), "x").created_at(base - Duration::hours(hours));
            store.save_note(&note).await.unwrap();
        }

        let created = store
            .notes_created_between(base - Duration::hours(24), base)
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        // Oldest first
        assert_eq!(created[0].title, "5h");

        let updated = store
            .notes_updated_between(base - Duration::hours(2), base)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].title, "1h");
    }
}
