//! Tier freshness policies.
//!
//! A tier remembers a marker for its last successful run. A policy decides
//! whether a value stamped with that marker may still be served:
//! - [`ValidityWindow`]: fresh while less than the window has elapsed
//! - [`CalendarDay`]: fresh for the same local calendar date only
//!
//! [`TierCache`] pairs a policy with the cached value, giving a
//! stale-while-valid, at-most-once-per-key cache.

use std::fmt::Debug;

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Freshness rule for one tier
pub trait Freshness {
    /// What a run is stamped with (an instant, a date)
    type Marker: Clone + PartialEq + Debug;

    /// Whether a value stamped `last` may still be served at `now`
    fn is_fresh(&self, last: &Self::Marker, now: &Self::Marker) -> bool;

    /// Whether the tier must run at `now`
    fn is_due(&self, last: Option<&Self::Marker>, now: &Self::Marker) -> bool {
        match last {
            Some(last) => !self.is_fresh(last, now),
            None => true,
        }
    }
}

/// Fresh while less than `window` has elapsed since the last run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    window: Duration,
}

impl ValidityWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Freshness for ValidityWindow {
    type Marker = DateTime<Utc>;

    fn is_fresh(&self, last: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
        now.signed_duration_since(*last) < self.window
    }
}

/// Fresh for the same calendar date; elapsed time is irrelevant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarDay;

impl Freshness for CalendarDay {
    type Marker = NaiveDate;

    fn is_fresh(&self, last: &NaiveDate, now: &NaiveDate) -> bool {
        last == now
    }
}

/// A single cached value governed by a freshness policy
#[derive(Debug, Clone)]
pub struct TierCache<P: Freshness, V> {
    policy: P,
    entry: Option<(P::Marker, V)>,
}

impl<P: Freshness, V> TierCache<P, V> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            entry: None,
        }
    }

    /// The cached value, if still fresh at `now`
    pub fn get(&self, now: &P::Marker) -> Option<&V> {
        match &self.entry {
            Some((marker, value)) if self.policy.is_fresh(marker, now) => Some(value),
            _ => None,
        }
    }

    /// The cached value regardless of freshness
    pub fn peek(&self) -> Option<&V> {
        self.entry.as_ref().map(|(_, v)| v)
    }

    pub fn marker(&self) -> Option<&P::Marker> {
        self.entry.as_ref().map(|(m, _)| m)
    }

    /// Whether a recomputation is needed at `now`
    pub fn is_due(&self, now: &P::Marker) -> bool {
        self.policy.is_due(self.marker(), now)
    }

    pub fn store(&mut self, marker: P::Marker, value: V) {
        self.entry = Some((marker, value));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
