//! Tiered refresh policy.
//!
//! - `policy`: freshness rules and the tier cache
//! - `session`: local session aggregation
//! - `state`: persisted refresh markers and usage counters
//! - `coordinator`: trigger handling across all three tiers

pub mod coordinator;
pub mod policy;
pub mod session;
pub mod state;

pub use coordinator::{
    day_window, hash_transcript, Backends, DailyCheck, ForegroundOutcome, NoteOutcome,
    RefreshCoordinator, RefreshError,
};
pub use policy::{CalendarDay, Freshness, TierCache, ValidityWindow};
pub use session::{summarize_session, RECENT_ACTIONS, SESSION_LOOKBACK_HOURS};
pub use state::{RefreshSnapshot, RefreshState, UsageCounters};
