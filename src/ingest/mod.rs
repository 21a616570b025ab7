//! Audio ingestion.
//!
//! Files dropped into the inbox directory become audio notes and are handed
//! to the refresh coordinator's per-note tier.
//!
//! ```text
//! inbox/*.m4a → InboxWatcher → Note → RefreshCoordinator::on_note_saved
//! ```

pub mod inbox;

pub use inbox::{compute_file_hash, ImportOutcome, InboxError, InboxWatcher, ScanResult, WatchHandle};
