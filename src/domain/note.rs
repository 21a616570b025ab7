//! Voice notes and their processing status.
//!
//! A note is created by the user and mutated only by the refresh
//! coordinator as per-note enrichment progresses.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of captured input: audio, typed text, or both
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: Uuid,

    /// Short human-readable title
    pub title: String,

    /// Recorded audio (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRef>,

    /// Transcript or typed text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Processing status
    pub status: NoteStatus,

    /// Last processing error (cleared on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the note was captured
    pub created_at: DateTime<Utc>,

    /// Last time the note was edited or processed
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a note from a recorded audio file
    pub fn from_audio(title: impl Into<String>, audio: AudioRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            audio: Some(audio),
            transcript: None,
            status: NoteStatus::Unprocessed,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a typed note; the text stands in for a transcript
    pub fn from_text(title: impl Into<String>, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            audio: None,
            transcript: Some(text.into()),
            status: NoteStatus::Unprocessed,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the capture timestamp (imports, tests)
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    /// True when transcription can be skipped
    pub fn has_transcript(&self) -> bool {
        self.transcript
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    /// Record a status transition
    pub fn transition(&mut self, status: NoteStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        if !status.is_failure() {
            self.error = None;
        }
    }

    /// Record a failure with its message
    pub fn fail(&mut self, status: NoteStatus, error: String, at: DateTime<Utc>) {
        debug_assert!(status.is_failure());
        self.status = status;
        self.error = Some(error);
        self.updated_at = at;
    }
}

/// Reference to a note's audio payload on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRef {
    /// Location of the audio file
    pub path: PathBuf,

    /// MIME type sent to the transcription API
    pub mime_type: String,

    /// File size in bytes
    pub size_bytes: u64,

    /// Recording length, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// SHA256 of the file content (12 hex chars)
    pub content_hash: String,
}

impl AudioRef {
    /// Recording length as a Duration
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Best-effort MIME type from a file extension
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "m4a" | "mp4" => "audio/mp4",
            "mp3" | "mpeg" | "mpga" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" | "oga" => "audio/ogg",
            "webm" => "audio/webm",
            "flac" => "audio/flac",
            _ => "application/octet-stream",
        }
    }
}

/// Processing status of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Never attempted
    Unprocessed,

    /// Transcript available, extraction not yet done
    Transcribed,

    /// Insights extracted
    Extracted,

    /// Transcription failed; extraction never ran
    TranscriptionFailed,

    /// Transcription succeeded but extraction failed
    ExtractionFailed,
}

impl NoteStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::TranscriptionFailed | Self::ExtractionFailed)
    }

    /// Short label for terminal output
    pub fn label(self) -> &'static str {
        match self {
            Self::Unprocessed => "NEW ",
            Self::Transcribed => "TRSC",
            Self::Extracted => "DONE",
            Self::TranscriptionFailed => "FTRS",
            Self::ExtractionFailed => "FEXT",
        }
    }
}

impl Default for NoteStatus {
    fn default() -> Self {
        Self::Unprocessed
    }
}
