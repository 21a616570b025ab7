//! Append-only JSONL journal.
//!
//! Every write appends one record; nothing is rewritten in place. Current
//! state is derived by replaying the file: the last record for a note id or
//! summary date wins, the last state record is the current snapshot.
//! Appends take an exclusive advisory lock so a watcher and a CLI command
//! can share one journal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use super::{sort_newest_first, NoteRepository, StoreError};
use crate::domain::{DailySummary, ExtractionResult, Note, RefreshEvent};
use crate::refresh::RefreshSnapshot;

/// One line of the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the record was appended
    pub timestamp: DateTime<Utc>,

    pub record: JournalRecord,
}

/// Record payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum JournalRecord {
    Note(Note),
    Extraction(ExtractionResult),
    DailySummary(DailySummary),
    State(RefreshSnapshot),
    Event(RefreshEvent),
}

/// State rebuilt from a replay
#[derive(Debug, Default)]
pub struct JournalState {
    pub notes: HashMap<Uuid, Note>,
    pub extractions: Vec<ExtractionResult>,
    pub daily: BTreeMap<NaiveDate, DailySummary>,
    pub snapshot: RefreshSnapshot,
    pub events: Vec<RefreshEvent>,
}

impl JournalState {
    fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Note(note) => {
                self.notes.insert(note.id, note);
            }
            JournalRecord::Extraction(extraction) => self.extractions.push(extraction),
            JournalRecord::DailySummary(summary) => {
                self.daily.insert(summary.date, summary);
            }
            JournalRecord::State(snapshot) => self.snapshot = snapshot,
            JournalRecord::Event(event) => self.events.push(event),
        }
    }
}

/// Block size used when scanning back for the last complete line
const TAIL_SCAN_BLOCK: u64 = 4096;

/// File-based repository using JSONL format
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    /// Use a journal at an explicit path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Open the journal under the configured home, creating the directory
    pub async fn open_default() -> anyhow::Result<Self> {
        let path = crate::config::config()?.journal_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record under an exclusive file lock
    async fn append(&self, record: JournalRecord) -> Result<(), StoreError> {
        let entry = JournalEntry {
            timestamp: Utc::now(),
            record,
        };
        let line = serde_json::to_string(&entry)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)?;

            file.lock_exclusive()?;
            truncate_torn_tail(&mut file, &path)?;
            writeln!(file, "{}", line)?;
            file.flush()?;

            // Lock is released when file is dropped
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Replay all records to build current state.
    ///
    /// A torn final line (crash mid-append) is skipped with a warning; a
    /// corrupt line elsewhere is an error.
    pub async fn replay(&self) -> Result<JournalState, StoreError> {
        let mut state = JournalState::default();

        if !self.path.exists() {
            return Ok(state);
        }

        let file = File::open(&self.path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut pending_error: Option<serde_json::Error> = None;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(err) = pending_error.take() {
                return Err(err.into());
            }

            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => state.apply(entry.record),
                Err(e) => pending_error = Some(e),
            }
        }

        if let Some(err) = pending_error {
            warn!(path = %self.path.display(), error = %err, "Skipping torn journal tail");
        }

        Ok(state)
    }
}

/// Cut an unterminated final line left by an interrupted append so the
/// next record starts on its own line. Caller holds the exclusive lock.
fn truncate_torn_tail(file: &mut std::fs::File, path: &Path) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    let mut buf = [0u8; TAIL_SCAN_BLOCK as usize];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_BLOCK);
        let block = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(block)?;

        if end == len && block.last() == Some(&b'\n') {
            return Ok(());
        }
        if let Some(pos) = block.iter().rposition(|b| *b == b'\n') {
            let keep = start + pos as u64 + 1;
            warn!(path = %path.display(), dropped = len - keep, "Truncating torn journal tail");
            return file.set_len(keep);
        }
        end = start;
    }

    if len > 0 {
        warn!(path = %path.display(), dropped = len, "Truncating torn journal tail");
        file.set_len(0)?;
    }
    Ok(())
}

#[async_trait]
impl NoteRepository for JournalStore {
    async fn save_note(&self, note: &Note) -> Result<(), StoreError> {
        self.append(JournalRecord::Note(note.clone())).await
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(self.replay().await?.notes.remove(&id))
    }

    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.replay().await?.notes.into_values().collect();
        sort_newest_first(&mut notes);
        Ok(notes)
    }

    async fn save_extraction(&self, extraction: &ExtractionResult) -> Result<(), StoreError> {
        self.append(JournalRecord::Extraction(extraction.clone())).await
    }

    async fn latest_extraction(&self, note_id: Uuid) -> Result<Option<ExtractionResult>, StoreError> {
        Ok(self
            .replay()
            .await?
            .extractions
            .into_iter()
            .rev()
            .find(|e| e.note_id == note_id))
    }

    async fn latest_extractions(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ExtractionResult>, StoreError> {
        let wanted: HashSet<Uuid> = note_ids.iter().copied().collect();
        let mut latest = HashMap::new();
        // Later records overwrite earlier ones
        for extraction in self.replay().await?.extractions {
            if wanted.contains(&extraction.note_id) {
                latest.insert(extraction.note_id, extraction);
            }
        }
        Ok(latest)
    }

    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError> {
        self.append(JournalRecord::DailySummary(summary.clone())).await
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        Ok(self.replay().await?.daily.remove(&date))
    }

    async fn load_snapshot(&self) -> Result<RefreshSnapshot, StoreError> {
        Ok(self.replay().await?.snapshot)
    }

    async fn save_snapshot(&self, snapshot: &RefreshSnapshot) -> Result<(), StoreError> {
        self.append(JournalRecord::State(snapshot.clone())).await
    }

    async fn record_event(&self, event: &RefreshEvent) -> Result<(), StoreError> {
        self.append(JournalRecord::Event(event.clone())).await
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<RefreshEvent>, StoreError> {
        let events = self.replay().await?.events;
        Ok(events.into_iter().rev().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NoteStatus, RefreshOutcome, Tier};
    use tempfile::TempDir;

    fn create_test_store() -> (JournalStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("journal.jsonl");
        (JournalStore::new(path), temp)
    }

    #[tokio::test]
    async fn test_replay_of_empty_journal() {
        let (store, _temp) = create_test_store();
        let state = store.replay().await.unwrap();
        assert!(state.notes.is_empty());
        assert_eq!(state.snapshot, RefreshSnapshot::default());
    }

    #[tokio::test]
    async fn test_last_note_record_wins() {
        let (store, _temp) = create_test_store();

        let mut note = Note::from_text("standup", "ship it");
        store.save_note(&note).await.unwrap();

        note.transition(NoteStatus::Extracted, Utc::now());
        store.save_note(&note).await.unwrap();

        let loaded = store.get_note(note.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Extracted);
        assert_eq!(store.list_notes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let (store, _temp) = create_test_store();

        let mut snapshot = RefreshSnapshot::default();
        snapshot.refresh.last_daily_brief_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        snapshot.counters.daily_briefs = 3;
        store.save_snapshot(&snapshot).await.unwrap();

        snapshot.counters.daily_briefs = 4;
        store.save_snapshot(&snapshot).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.counters.daily_briefs, 4);
        assert_eq!(loaded.refresh.last_daily_brief_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[tokio::test]
    async fn test_events_newest_first() {
        let (store, _temp) = create_test_store();

        for subject in ["a", "b", "c"] {
            let event = RefreshEvent::new(Tier::Session, subject, RefreshOutcome::Refreshed);
            store.record_event(&event).await.unwrap();
        }

        let events = store.recent_events(2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].subject, "c");
        assert_eq!(events[1].subject, "b");
    }

    #[tokio::test]
    async fn test_torn_tail_is_skipped() {
        let (store, _temp) = create_test_store();

        let note = Note::from_text("n", "t");
        store.save_note(&note).await.unwrap();

        // Simulate a crash mid-append
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap();
        write!(file, "{{\"timestamp\": \"2024-").unwrap();

        let state = store.replay().await.unwrap();
        assert_eq!(state.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_torn_tail_keeps_later_records() {
        let (store, _temp) = create_test_store();

        let first = Note::from_text("first", "t");
        store.save_note(&first).await.unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap();
        write!(file, "{{\"timestamp\": \"2024-").unwrap();
        drop(file);

        let second = Note::from_text("second", "t");
        let third = Note::from_text("third", "t");
        store.save_note(&second).await.unwrap();
        store.save_note(&third).await.unwrap();

        let state = store.replay().await.unwrap();
        assert_eq!(state.notes.len(), 3);
        assert!(state.notes.contains_key(&second.id));
        assert!(state.notes.contains_key(&third.id));

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(!content.contains("\"2024-{"));
    }

    #[tokio::test]
    async fn test_torn_only_line_is_dropped() {
        let (store, _temp) = create_test_store();

        std::fs::write(store.path(), "{\"timestamp\": ").unwrap();
        let note = Note::from_text("n", "t");
        store.save_note(&note).await.unwrap();

        let state = store.replay().await.unwrap();
        assert_eq!(state.notes.len(), 1);
        assert!(state.notes.contains_key(&note.id));
    }

    #[tokio::test]
    async fn test_latest_extractions_in_one_pass() {
        let (store, _temp) = create_test_store();
        let a = Note::from_text("a", "t");
        let b = Note::from_text("b", "t");
        let other = Note::from_text("other", "t");

        for (note, model) in [(&a, "v1"), (&b, "v1"), (&a, "v2"), (&other, "v1")] {
            let extraction = ExtractionResult {
                id: Uuid::new_v4(),
                note_id: note.id,
                decisions: vec![],
                actions: vec![],
                commitments: vec![],
                unresolved: vec![],
                model: model.to_string(),
                transcript_hash: "0".repeat(16),
                extracted_at: Utc::now(),
            };
            store.save_extraction(&extraction).await.unwrap();
        }

        let latest = store.latest_extractions(&[a.id, b.id]).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&a.id].model, "v2");
        assert_eq!(latest[&b.id].model, "v1");
        assert!(!latest.contains_key(&other.id));
    }

    #[tokio::test]
    async fn test_corrupt_middle_line_is_an_error() {
        let (store, _temp) = create_test_store();

        std::fs::write(store.path(), "not json\n").unwrap();
        store.save_note(&Note::from_text("n", "t")).await.unwrap();

        assert!(matches!(
            store.replay().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
