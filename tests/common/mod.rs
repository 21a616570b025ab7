//! Shared test fixtures: fake backends that count their calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use voxbrief::api::{
    ApiError, AudioClip, DigestRequest, DigestWriter, ExtractedInsights, Extractor, Transcriber,
    Transcript,
};
use voxbrief::config::RefreshSettings;
use voxbrief::domain::{DailySummary, DigestBody, ExtractionResult, InsightItem, Note, RefreshEvent};
use voxbrief::refresh::{Backends, RefreshCoordinator, RefreshSnapshot};
use voxbrief::store::{MemoryStore, NoteRepository, StoreError};

fn unavailable() -> ApiError {
    ApiError::Upstream {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct FakeTranscriber {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn model(&self) -> &str {
        "fake-stt"
    }

    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(Transcript {
            text: format!("transcript of {}", clip.file_name),
            chunks: 1,
        })
    }
}

#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn model(&self) -> &str {
        "fake-extract"
    }

    async fn extract(&self, transcript: &str) -> Result<ExtractedInsights, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::MalformedResponse("not json".to_string()));
        }
        Ok(ExtractedInsights {
            decisions: vec![InsightItem::new("ship on friday")],
            actions: vec![InsightItem::new(format!("follow up: {}", transcript))],
            commitments: vec![],
            unresolved: vec![],
        })
    }
}

#[derive(Default)]
pub struct FakeDigest {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Simulated latency, to widen race windows
    pub delay: Mutex<Option<Duration>>,
    /// Note titles of the last request
    pub last_titles: Mutex<Vec<String>>,
}

#[async_trait]
impl DigestWriter for FakeDigest {
    fn model(&self) -> &str {
        "fake-digest"
    }

    async fn digest(&self, request: &DigestRequest) -> Result<DigestBody, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        *self.last_titles.lock().unwrap() = request.notes.iter().map(|n| n.title.clone()).collect();

        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::RateLimited {
                retry_after_secs: Some(30),
            });
        }
        Ok(DigestBody {
            summary: format!("{} notes on {}", request.notes.len(), request.date),
            highlights: vec![],
            open_loops: vec![],
        })
    }
}

/// The three fakes plus handles for asserting on them
#[derive(Clone, Default)]
pub struct Fakes {
    pub transcriber: Arc<FakeTranscriber>,
    pub extractor: Arc<FakeExtractor>,
    pub digest: Arc<FakeDigest>,
}

impl Fakes {
    pub fn backends(&self) -> Backends {
        Backends {
            transcriber: self.transcriber.clone(),
            extractor: self.extractor.clone(),
            digest: self.digest.clone(),
        }
    }

    pub fn transcriptions(&self) -> usize {
        self.transcriber.calls.load(Ordering::SeqCst)
    }

    pub fn extractions(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }

    pub fn digests(&self) -> usize {
        self.digest.calls.load(Ordering::SeqCst)
    }
}

pub fn utc_settings(window_minutes: u32) -> RefreshSettings {
    RefreshSettings {
        session_window_minutes: window_minutes,
        utc_offset: FixedOffset::east_opt(0),
    }
}

pub fn coordinator_with(
    store: Arc<MemoryStore>,
    fakes: &Fakes,
    snapshot: RefreshSnapshot,
) -> RefreshCoordinator {
    RefreshCoordinator::new(store, fakes.backends(), utc_settings(30), snapshot)
}

pub fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
}

/// Write a mono 16-bit WAV tone of the given length
pub fn write_wav(path: &Path, sample_rate: u32, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(f64::from(sample_rate) * seconds) as usize {
        writer.write_sample(((i as f32 * 0.1).sin() * 6000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Memory store that counts extraction lookups and can refuse snapshot saves
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    pub single_lookups: AtomicUsize,
    pub bulk_lookups: AtomicUsize,
    pub fail_snapshots: AtomicBool,
}

#[async_trait]
impl NoteRepository for InstrumentedStore {
    async fn save_note(&self, note: &Note) -> Result<(), StoreError> {
        self.inner.save_note(note).await
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        self.inner.get_note(id).await
    }

    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        self.inner.list_notes().await
    }

    async fn save_extraction(&self, extraction: &ExtractionResult) -> Result<(), StoreError> {
        self.inner.save_extraction(extraction).await
    }

    async fn latest_extraction(&self, note_id: Uuid) -> Result<Option<ExtractionResult>, StoreError> {
        self.single_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.latest_extraction(note_id).await
    }

    async fn latest_extractions(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ExtractionResult>, StoreError> {
        self.bulk_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.latest_extractions(note_ids).await
    }

    async fn save_daily_summary(&self, summary: &DailySummary) -> Result<(), StoreError> {
        self.inner.save_daily_summary(summary).await
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        self.inner.daily_summary(date).await
    }

    async fn load_snapshot(&self) -> Result<RefreshSnapshot, StoreError> {
        self.inner.load_snapshot().await
    }

    async fn save_snapshot(&self, snapshot: &RefreshSnapshot) -> Result<(), StoreError> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.save_snapshot(snapshot).await
    }

    async fn record_event(&self, event: &RefreshEvent) -> Result<(), StoreError> {
        self.inner.record_event(event).await
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<RefreshEvent>, StoreError> {
        self.inner.recent_events(limit).await
    }
}
