//! Refresh events recorded for every tier run.
//!
//! Events are appended to the journal and never rewritten; they exist for
//! inspection (`voxbrief status`) and are not used to derive state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single tier run in the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When the run finished
    pub timestamp: DateTime<Utc>,

    /// Which tier ran
    pub tier: Tier,

    /// What the run was about: a note id, a date, or "session"
    pub subject: String,

    /// How the run ended
    pub outcome: RefreshOutcome,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl RefreshEvent {
    /// Create a new event with the current timestamp
    pub fn new(tier: Tier, subject: impl Into<String>, outcome: RefreshOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tier,
            subject: subject.into(),
            outcome,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Refresh granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Transcription + extraction of one note
    Note,

    /// Local aggregation over the current session
    Session,

    /// One digest call per calendar date
    Daily,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Note => "note",
            Self::Session => "session",
            Self::Daily => "daily",
        };
        f.write_str(name)
    }
}

/// Result of a tier run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Fresh value computed
    Refreshed,

    /// Cached value still valid; nothing done
    Skipped,

    /// The run failed; state left as it was
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RefreshEvent::new(Tier::Daily, "2024-03-02", RefreshOutcome::Failed)
            .with_duration(1500)
            .with_error("rate limited".to_string());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"tier\":\"daily\""));

        let parsed: RefreshEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.outcome, RefreshOutcome::Failed);
        assert_eq!(parsed.duration_ms, Some(1500));
        assert_eq!(parsed.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Note.to_string(), "note");
        assert_eq!(Tier::Session.to_string(), "session");
    }
}
