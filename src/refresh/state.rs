//! Refresh state and usage counters.
//!
//! Both are owned by the coordinator, loaded from and saved to the
//! repository, and only mutated while holding the coordinator's state lock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// When each aggregate tier last ran successfully
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshState {
    /// Last SessionSummary computation
    #[serde(default)]
    pub last_session_refresh: Option<DateTime<Utc>>,

    /// Local calendar date of the last DailySummary
    #[serde(default)]
    pub last_daily_brief_date: Option<NaiveDate>,
}

/// Usage counters consulted for plan limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Notes handed to the coordinator
    #[serde(default)]
    pub notes_recorded: u64,

    /// Successful transcription calls
    #[serde(default)]
    pub transcriptions: u64,

    /// Successful extraction calls
    #[serde(default)]
    pub extractions: u64,

    /// Successful digest calls
    #[serde(default)]
    pub daily_briefs: u64,

    /// Session summaries computed
    #[serde(default)]
    pub session_refreshes: u64,

    /// Failed remote calls of any tier
    #[serde(default)]
    pub failures: u64,

    /// Seconds of audio successfully transcribed
    #[serde(default)]
    pub transcribed_seconds: f64,
}

/// Everything the coordinator persists between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshSnapshot {
    #[serde(default)]
    pub refresh: RefreshState,

    #[serde(default)]
    pub counters: UsageCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tolerates_missing_fields() {
        let snapshot: RefreshSnapshot =
            serde_json::from_str(r#"{"refresh": {"last_daily_brief_date": "2024-03-01"}}"#).unwrap();
        assert_eq!(
            snapshot.refresh.last_daily_brief_date,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(snapshot.counters, UsageCounters::default());
    }
}
