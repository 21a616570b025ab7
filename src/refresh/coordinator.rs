//! The refresh coordinator.
//!
//! Decides, per trigger, whether to run a tier and commits the result:
//! - note saved: transcription then extraction, one call each
//! - app foregrounded: local session summary, then the daily check
//! - daily check: one digest call per local calendar date
//!
//! Locking: `state` guards refresh state and counters and is only held for
//! short commits. `session` and `daily_gate` are held across a tier's
//! check, computation and commit so racing triggers cannot run a tier twice.
//! Per-note network calls run outside every lock.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::policy::{CalendarDay, Freshness, TierCache, ValidityWindow};
use super::session::summarize_session;
use super::state::{RefreshSnapshot, UsageCounters};
use crate::api::{
    ApiError, AudioClip, DigestNote, DigestRequest, DigestWriter, Extractor, OpenAiClient,
    Transcriber,
};
use crate::audio::read_duration;
use crate::config::RefreshSettings;
use crate::domain::{
    AudioRef, DailySummary, ExtractionResult, Note, NoteStatus, RefreshEvent, RefreshOutcome,
    SessionSummary, Tier,
};
use crate::store::{NoteRepository, StoreError};

/// Errors surfaced to the caller of a trigger
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Transcription failed for note {note_id}: {source}")]
    Transcription { note_id: Uuid, source: ApiError },

    #[error("Extraction failed for note {note_id}: {source}")]
    Extraction { note_id: Uuid, source: ApiError },

    #[error("Daily brief for {date} failed: {source}")]
    Daily { date: NaiveDate, source: ApiError },

    #[error("Could not read audio for note {note_id}: {source}")]
    Audio {
        note_id: Uuid,
        source: std::io::Error,
    },

    #[error("Note {0} has neither audio nor text")]
    EmptyNote(Uuid),

    #[error("Note not found: {0}")]
    NoteNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RefreshError {
    /// The remote failure behind this error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Transcription { source, .. }
            | Self::Extraction { source, .. }
            | Self::Daily { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The three remote backends
#[derive(Clone)]
pub struct Backends {
    pub transcriber: Arc<dyn Transcriber>,
    pub extractor: Arc<dyn Extractor>,
    pub digest: Arc<dyn DigestWriter>,
}

impl Backends {
    /// Use one HTTP client for all three calls
    pub fn from_client(client: OpenAiClient) -> Self {
        let client = Arc::new(client);
        Self {
            transcriber: client.clone(),
            extractor: client.clone(),
            digest: client,
        }
    }
}

/// Result of a successful `on_note_saved`
#[derive(Debug, Clone)]
pub struct NoteOutcome {
    pub note: Note,
    pub extraction: ExtractionResult,
    /// Whether a transcription call was made
    pub transcribed: bool,
}

/// Result of a daily check
#[derive(Debug, Clone)]
pub enum DailyCheck {
    /// A brief already exists for this date; nothing done
    AlreadyDone(NaiveDate),

    /// A new brief was generated
    Generated(DailySummary),

    /// The digest call failed; state left unchanged
    Failed { date: NaiveDate, error: String },
}

/// Result of `on_app_foregrounded`
#[derive(Debug, Clone)]
pub struct ForegroundOutcome {
    pub session: SessionSummary,
    /// False when the cached summary was served
    pub session_refreshed: bool,
    pub daily: DailyCheck,
}

/// Coordinates the per-note, per-session and per-day tiers
pub struct RefreshCoordinator {
    repo: Arc<dyn NoteRepository>,
    backends: Backends,
    settings: RefreshSettings,
    state: Mutex<RefreshSnapshot>,
    session: Mutex<TierCache<ValidityWindow, SessionSummary>>,
    daily_gate: Mutex<()>,
}

impl RefreshCoordinator {
    /// Create a coordinator from an explicit snapshot
    pub fn new(
        repo: Arc<dyn NoteRepository>,
        backends: Backends,
        settings: RefreshSettings,
        snapshot: RefreshSnapshot,
    ) -> Self {
        let window = ValidityWindow::new(settings.session_window());
        Self {
            repo,
            backends,
            settings,
            state: Mutex::new(snapshot),
            session: Mutex::new(TierCache::new(window)),
            daily_gate: Mutex::new(()),
        }
    }

    /// Create a coordinator with the snapshot saved in the repository
    pub async fn load(
        repo: Arc<dyn NoteRepository>,
        backends: Backends,
        settings: RefreshSettings,
    ) -> Result<Self, StoreError> {
        let snapshot = repo.load_snapshot().await?;
        Ok(Self::new(repo, backends, settings, snapshot))
    }

    pub fn repository(&self) -> &Arc<dyn NoteRepository> {
        &self.repo
    }

    /// Current refresh state and counters
    pub async fn snapshot(&self) -> RefreshSnapshot {
        self.state.lock().await.clone()
    }

    /// Last computed session summary, fresh or not
    pub async fn cached_session(&self) -> Option<SessionSummary> {
        self.session.lock().await.peek().cloned()
    }

    /// Local calendar date of an instant
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.settings.local_date(now)
    }

    // ------------------------------------------------------------------
    // Per-note tier
    // ------------------------------------------------------------------

    /// Transcribe (if needed) and extract insights for a new or edited note
    #[instrument(skip(self, note), fields(note_id = %note.id))]
    pub async fn on_note_saved(&self, note: Note) -> Result<NoteOutcome, RefreshError> {
        self.update_counters(|c| c.notes_recorded += 1).await?;
        self.process_note(note).await
    }

    /// Manually re-run the per-note tier for a stored note
    #[instrument(skip(self))]
    pub async fn retry_note(&self, id: Uuid) -> Result<NoteOutcome, RefreshError> {
        let note = self
            .repo
            .get_note(id)
            .await?
            .ok_or(RefreshError::NoteNotFound(id))?;
        self.process_note(note).await
    }

    async fn process_note(&self, mut note: Note) -> Result<NoteOutcome, RefreshError> {
        let started = Instant::now();
        self.repo.save_note(&note).await?;

        // Step 1: transcription
        let transcribed = !note.has_transcript();
        if transcribed {
            let (transcript, seconds) = match self.transcribe(&note).await {
                Ok(t) => t,
                Err(err) => {
                    let message = err.to_string();
                    note.fail(NoteStatus::TranscriptionFailed, message.clone(), Utc::now());
                    self.repo.save_note(&note).await?;
                    self.update_counters(|c| c.failures += 1).await?;
                    self.record(
                        RefreshEvent::new(Tier::Note, note.id.to_string(), RefreshOutcome::Failed)
                            .with_duration(elapsed_ms(started))
                            .with_error(message),
                    )
                    .await;
                    warn!(note_id = %note.id, error = %err, "Transcription failed");
                    return Err(err);
                }
            };

            if let (Some(audio), Some(secs)) = (note.audio.as_mut(), seconds) {
                audio.duration_secs.get_or_insert(secs);
            }
            note.transcript = Some(transcript);
            note.transition(NoteStatus::Transcribed, Utc::now());
            self.repo.save_note(&note).await?;
            self.update_counters(|c| {
                c.transcriptions += 1;
                c.transcribed_seconds += seconds.unwrap_or(0.0);
            })
            .await?;
        } else if note.status != NoteStatus::Transcribed {
            note.transition(NoteStatus::Transcribed, Utc::now());
        }

        // Step 2: extraction
        let transcript = note.transcript.clone().unwrap_or_default();
        let insights = match self.backends.extractor.extract(&transcript).await {
            Ok(insights) => insights,
            Err(source) => {
                let message = source.to_string();
                note.fail(NoteStatus::ExtractionFailed, message.clone(), Utc::now());
                self.repo.save_note(&note).await?;
                self.update_counters(|c| c.failures += 1).await?;
                self.record(
                    RefreshEvent::new(Tier::Note, note.id.to_string(), RefreshOutcome::Failed)
                        .with_duration(elapsed_ms(started))
                        .with_error(message),
                )
                .await;
                warn!(note_id = %note.id, error = %source, "Extraction failed");
                return Err(RefreshError::Extraction {
                    note_id: note.id,
                    source,
                });
            }
        };

        let now = Utc::now();
        let extraction = ExtractionResult {
            id: Uuid::new_v4(),
            note_id: note.id,
            decisions: insights.decisions,
            actions: insights.actions,
            commitments: insights.commitments,
            unresolved: insights.unresolved,
            model: self.backends.extractor.model().to_string(),
            transcript_hash: hash_transcript(&transcript),
            extracted_at: now,
        };
        self.repo.save_extraction(&extraction).await?;

        note.transition(NoteStatus::Extracted, now);
        self.repo.save_note(&note).await?;
        self.update_counters(|c| c.extractions += 1).await?;

        let duration_ms = elapsed_ms(started);
        self.record(
            RefreshEvent::new(Tier::Note, note.id.to_string(), RefreshOutcome::Refreshed)
                .with_duration(duration_ms),
        )
        .await;
        info!(
            note_id = %note.id,
            items = extraction.total_items(),
            transcribed,
            duration_ms,
            "Note enriched"
        );

        Ok(NoteOutcome {
            note,
            extraction,
            transcribed,
        })
    }

    /// Load the note's audio and run the transcription call.
    /// Returns the transcript and the clip length in seconds, when known.
    async fn transcribe(&self, note: &Note) -> Result<(String, Option<f64>), RefreshError> {
        let audio = note.audio.as_ref().ok_or(RefreshError::EmptyNote(note.id))?;

        let clip = load_clip(audio).await.map_err(|source| RefreshError::Audio {
            note_id: note.id,
            source,
        })?;

        let transcript = self
            .backends
            .transcriber
            .transcribe(&clip)
            .await
            .map_err(|source| RefreshError::Transcription {
                note_id: note.id,
                source,
            })?;

        debug!(chunks = transcript.chunks, chars = transcript.text.len(), "Transcribed");
        Ok((transcript.text, clip.duration.map(|d| d.as_secs_f64())))
    }

    // ------------------------------------------------------------------
    // Per-session tier
    // ------------------------------------------------------------------

    /// Serve or recompute the session summary, then run the daily check.
    ///
    /// Performs no network access of its own; a failing daily check is
    /// reported in the outcome rather than raised.
    #[instrument(skip(self))]
    pub async fn on_app_foregrounded(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ForegroundOutcome, RefreshError> {
        let (session, session_refreshed) = self.session_summary(now, false).await?;

        let today = self.local_date(now);
        let daily = match self.check_daily_brief(today).await {
            Ok(check) => check,
            Err(err) => {
                warn!(%today, error = %err, "Daily check failed");
                DailyCheck::Failed {
                    date: today,
                    error: err.to_string(),
                }
            }
        };

        Ok(ForegroundOutcome {
            session,
            session_refreshed,
            daily,
        })
    }

    /// Recompute the session summary regardless of its age
    pub async fn refresh_session(&self, now: DateTime<Utc>) -> Result<SessionSummary, RefreshError> {
        Ok(self.session_summary(now, true).await?.0)
    }

    /// Serve the cached session summary while valid, otherwise recompute.
    /// Returns whether a recomputation happened.
    pub async fn session_summary(
        &self,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<(SessionSummary, bool), RefreshError> {
        let mut cache = self.session.lock().await;

        if !force {
            if let Some(cached) = cache.get(&now) {
                debug!("Session summary still valid");
                return Ok((cached.clone(), false));
            }
        }

        let started = Instant::now();
        let summary = match summarize_session(self.repo.as_ref(), now).await {
            Ok(summary) => summary,
            Err(err) => {
                self.record(
                    RefreshEvent::new(Tier::Session, "session", RefreshOutcome::Failed)
                        .with_error(err.to_string()),
                )
                .await;
                return Err(err.into());
            }
        };

        self.commit_state(|state| {
            state.refresh.last_session_refresh = Some(now);
            state.counters.session_refreshes += 1;
        })
        .await?;
        cache.store(now, summary.clone());

        self.record(
            RefreshEvent::new(Tier::Session, "session", RefreshOutcome::Refreshed)
                .with_duration(elapsed_ms(started)),
        )
        .await;
        info!(notes = summary.note_count, "Session summary refreshed");

        Ok((summary, true))
    }

    // ------------------------------------------------------------------
    // Per-day tier
    // ------------------------------------------------------------------

    /// Generate the brief for `today` unless one was already produced
    #[instrument(skip(self))]
    pub async fn check_daily_brief(&self, today: NaiveDate) -> Result<DailyCheck, RefreshError> {
        let _gate = self.daily_gate.lock().await;

        let last = self.state.lock().await.refresh.last_daily_brief_date;
        if !CalendarDay.is_due(last.as_ref(), &today) {
            debug!(%today, "Daily brief already generated");
            self.record(RefreshEvent::new(
                Tier::Daily,
                today.to_string(),
                RefreshOutcome::Skipped,
            ))
            .await;
            return Ok(DailyCheck::AlreadyDone(today));
        }

        self.generate_daily_brief(today).await.map(DailyCheck::Generated)
    }

    /// Generate the brief for `today` even if one exists
    #[instrument(skip(self))]
    pub async fn force_daily_brief(&self, today: NaiveDate) -> Result<DailySummary, RefreshError> {
        let _gate = self.daily_gate.lock().await;
        self.generate_daily_brief(today).await
    }

    /// One digest call over the local day preceding `today`. Caller holds the gate.
    async fn generate_daily_brief(&self, today: NaiveDate) -> Result<DailySummary, RefreshError> {
        let started = Instant::now();
        let (window_start, window_end) = day_window(today, &self.settings);

        let notes = self.repo.notes_created_between(window_start, window_end).await?;
        let ids: Vec<Uuid> = notes.iter().map(|n| n.id).collect();
        let mut extractions = self.repo.latest_extractions(&ids).await?;
        let digest_notes: Vec<DigestNote> = notes
            .iter()
            .map(|note| digest_note(note, extractions.remove(&note.id)))
            .collect();

        let request = DigestRequest {
            date: today,
            window_start,
            window_end,
            notes: digest_notes,
        };

        let digest = match self.backends.digest.digest(&request).await {
            Ok(digest) => digest,
            Err(source) => {
                self.update_counters(|c| c.failures += 1).await?;
                self.record(
                    RefreshEvent::new(Tier::Daily, today.to_string(), RefreshOutcome::Failed)
                        .with_duration(elapsed_ms(started))
                        .with_error(source.to_string()),
                )
                .await;
                error!(%today, error = %source, "Daily brief failed");
                return Err(RefreshError::Daily {
                    date: today,
                    source,
                });
            }
        };

        let summary = DailySummary {
            date: today,
            window_start,
            window_end,
            note_count: notes.len(),
            digest,
            model: self.backends.digest.model().to_string(),
            generated_at: Utc::now(),
        };
        self.repo.save_daily_summary(&summary).await?;

        self.commit_state(|state| {
            state.refresh.last_daily_brief_date = Some(today);
            state.counters.daily_briefs += 1;
        })
        .await?;

        self.record(
            RefreshEvent::new(Tier::Daily, today.to_string(), RefreshOutcome::Refreshed)
                .with_duration(elapsed_ms(started)),
        )
        .await;
        info!(%today, notes = summary.note_count, "Daily brief generated");

        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Shared state
    // ------------------------------------------------------------------

    async fn update_counters<F>(&self, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UsageCounters),
    {
        self.commit_state(|state| update(&mut state.counters)).await
    }

    /// Apply an update to a copy of the state, persist the copy, then swap
    /// it in. A failed save leaves the in-memory state untouched.
    async fn commit_state<F>(&self, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut RefreshSnapshot),
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        update(&mut next);
        self.repo.save_snapshot(&next).await?;
        *state = next;
        Ok(())
    }

    async fn record(&self, event: RefreshEvent) {
        if let Err(e) = self.repo.record_event(&event).await {
            warn!(tier = %event.tier, error = %e, "Failed to record refresh event");
        }
    }
}

/// UTC bounds of the local calendar day before `today`.
///
/// Follows the configured calendar, so a day that crosses a DST change is
/// 23 or 25 hours long.
pub fn day_window(today: NaiveDate, settings: &RefreshSettings) -> (DateTime<Utc>, DateTime<Utc>) {
    let yesterday = today.pred_opt().unwrap_or(today);
    let end = settings.local_midnight(today);
    let start = settings.local_midnight(yesterday);
    if start < end {
        (start, end)
    } else {
        (end - Duration::hours(24), end)
    }
}

/// Hash a transcript (first 16 hex chars of SHA256)
pub fn hash_transcript(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

fn digest_note(note: &Note, extraction: Option<ExtractionResult>) -> DigestNote {
    let extraction = extraction.unwrap_or_else(|| ExtractionResult {
        id: Uuid::nil(),
        note_id: note.id,
        decisions: vec![],
        actions: vec![],
        commitments: vec![],
        unresolved: vec![],
        model: String::new(),
        transcript_hash: String::new(),
        extracted_at: note.updated_at,
    });

    DigestNote {
        title: note.title.clone(),
        created_at: note.created_at,
        status: note.status,
        transcript: note.transcript.clone(),
        decisions: extraction.decisions,
        actions: extraction.actions,
        commitments: extraction.commitments,
        unresolved: extraction.unresolved,
    }
}

/// Read a note's audio file into a clip, probing its length if unknown
async fn load_clip(audio: &AudioRef) -> std::io::Result<AudioClip> {
    let bytes = tokio::fs::read(&audio.path).await?;
    let duration = match audio.duration() {
        Some(duration) => Some(duration),
        None => read_duration(&audio.path)
            .await
            .map(std::time::Duration::from_secs_f64),
    };
    Ok(AudioClip {
        bytes,
        file_name: file_name(&audio.path),
        mime_type: audio.mime_type.clone(),
        duration,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{FixedOffset, TimeZone};

    fn fixed(seconds: i32) -> RefreshSettings {
        RefreshSettings {
            session_window_minutes: 30,
            utc_offset: FixedOffset::east_opt(seconds),
        }
    }

    #[test]
    fn test_day_window_utc() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let (start, end) = day_window(today, &fixed(0));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_window_with_offset() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        // UTC+02:00: local midnight is 22:00 UTC the day before
        let (start, end) = day_window(today, &fixed(2 * 3600));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_day_window_follows_system_calendar() {
        let settings = RefreshSettings::default();
        // Covers the US and EU spring-forward dates
        for (y, m, d) in [(2024, 3, 11), (2024, 4, 1), (2024, 11, 4), (2024, 7, 15)] {
            let today = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let (start, end) = day_window(today, &settings);
            assert_eq!(end, settings.local_midnight(today));
            assert_eq!(settings.local_date(start), today.pred_opt().unwrap());
            assert_eq!(settings.local_date(end), today);
            let hours = (end - start).num_hours();
            assert!((23..=25).contains(&hours), "{} hours on {}", hours, today);
        }
    }

    #[test]
    fn test_hash_transcript() {
        let a = hash_transcript("ship friday");
        assert_eq!(a, hash_transcript("ship friday"));
        assert_ne!(a, hash_transcript("ship monday"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_api_error_accessor() {
        let err = RefreshError::Daily {
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            source: ApiError::RateLimited {
                retry_after_secs: None,
            },
        };
        assert_eq!(err.api_error().map(ApiError::kind), Some("rate_limited"));
        assert!(RefreshError::EmptyNote(Uuid::nil()).api_error().is_none());
    }
}
