//! Local session aggregation.
//!
//! A session summary covers notes updated in the trailing
//! [`SESSION_LOOKBACK_HOURS`] up to the computation instant, and reads only
//! the local repository.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{NoteStatus, SessionSummary};
use crate::store::{NoteRepository, StoreError};

/// How far back a session summary looks
pub const SESSION_LOOKBACK_HOURS: i64 = 24;

/// Most recent actions carried on a summary
pub const RECENT_ACTIONS: usize = 5;

/// Compute a session summary from local data
pub async fn summarize_session(
    repo: &dyn NoteRepository,
    now: DateTime<Utc>,
) -> Result<SessionSummary, StoreError> {
    let window_start = now - Duration::hours(SESSION_LOOKBACK_HOURS);

    // Newest first
    let notes: Vec<_> = repo
        .list_notes()
        .await?
        .into_iter()
        .filter(|n| n.updated_at >= window_start && n.updated_at <= now)
        .collect();

    let extracted: Vec<Uuid> = notes
        .iter()
        .filter(|n| n.status == NoteStatus::Extracted)
        .map(|n| n.id)
        .collect();
    let extractions = repo.latest_extractions(&extracted).await?;

    let mut summary = SessionSummary {
        window_start,
        window_end: now,
        note_count: notes.len(),
        extracted_count: 0,
        pending_count: 0,
        failed_count: 0,
        decision_count: 0,
        action_count: 0,
        commitment_count: 0,
        unresolved_count: 0,
        recent_actions: Vec::new(),
        failed_notes: Vec::new(),
    };

    for note in &notes {
        match note.status {
            NoteStatus::Extracted => summary.extracted_count += 1,
            NoteStatus::Unprocessed | NoteStatus::Transcribed => summary.pending_count += 1,
            NoteStatus::TranscriptionFailed | NoteStatus::ExtractionFailed => {
                summary.failed_count += 1;
                summary.failed_notes.push(note.id);
            }
        }

        if let Some(extraction) = extractions.get(&note.id) {
            summary.decision_count += extraction.decisions.len();
            summary.action_count += extraction.actions.len();
            summary.commitment_count += extraction.commitments.len();
            summary.unresolved_count += extraction.unresolved.len();

            let room = RECENT_ACTIONS.saturating_sub(summary.recent_actions.len());
            summary
                .recent_actions
                .extend(extraction.actions.iter().take(room).cloned());
        }
    }

    Ok(summary)
}
