//! Session and daily aggregates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::insights::InsightItem;

/// Local aggregate over notes touched in the current session window.
///
/// Computed without any network access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Start of the aggregated window
    pub window_start: DateTime<Utc>,

    /// End of the aggregated window (the computation instant)
    pub window_end: DateTime<Utc>,

    /// Notes updated inside the window
    pub note_count: usize,

    pub extracted_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,

    pub decision_count: usize,
    pub action_count: usize,
    pub commitment_count: usize,
    pub unresolved_count: usize,

    /// Most recent actions, newest first
    pub recent_actions: Vec<InsightItem>,

    /// Notes that need a manual retry
    pub failed_notes: Vec<Uuid>,
}

impl SessionSummary {
    pub fn computed_at(&self) -> DateTime<Utc> {
        self.window_end
    }

    pub fn is_empty(&self) -> bool {
        self.note_count == 0
    }
}

/// Digest for one local calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    /// The calendar date this brief was produced for
    pub date: NaiveDate,

    /// Covered activity window (the preceding local day)
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    /// Notes included in the digest request
    pub note_count: usize,

    /// Parsed digest response
    pub digest: DigestBody,

    /// Model that produced the digest
    pub model: String,

    pub generated_at: DateTime<Utc>,
}

/// Structured digest returned by the language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestBody {
    pub summary: String,

    #[serde(default)]
    pub highlights: Vec<String>,

    #[serde(default)]
    pub open_loops: Vec<String>,
}
