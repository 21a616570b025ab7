//! Remote enrichment APIs.
//!
//! The coordinator talks to three remote calls through the traits below:
//! transcription, insight extraction, and the daily digest. All three share
//! one failure contract, [`ApiError`].

pub mod chunking;
pub mod openai;
pub mod parse;
pub mod prompts;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{InsightItem, NoteStatus};

pub use chunking::{join_transcripts, plan_chunks, split_clip, ChunkLimits, ChunkSpan};
pub use openai::OpenAiClient;
pub use parse::{parse_digest, parse_extraction, ExtractedInsights};

/// Failure of a single remote call
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// An oversized clip could not be decoded for splitting
    #[error("Cannot split audio: {0}")]
    InvalidAudio(String),
}

impl ApiError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        if status == 429 {
            Self::RateLimited { retry_after_secs }
        } else {
            Self::Upstream { status, body }
        }
    }

    /// Stable short name for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable(_) => "network_unavailable",
            Self::Upstream { .. } => "upstream_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidAudio(_) => "invalid_audio",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string(), None);
        }
        Self::NetworkUnavailable(err.to_string())
    }
}

/// Audio payload handed to a transcriber
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub duration: Option<Duration>,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Transcript returned for a whole clip
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Chunk transcripts joined in chunk order
    pub text: String,

    /// Number of uploads the clip was split into
    pub chunks: usize,
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Model identifier recorded on results
    fn model(&self) -> &str;

    /// Transcribe a clip. Chunking of oversized clips happens inside.
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, ApiError>;
}

/// Structured insight extraction backend
#[async_trait]
pub trait Extractor: Send + Sync {
    fn model(&self) -> &str;

    async fn extract(&self, transcript: &str) -> Result<ExtractedInsights, ApiError>;
}

/// Daily digest backend
#[async_trait]
pub trait DigestWriter: Send + Sync {
    fn model(&self) -> &str;

    async fn digest(&self, request: &DigestRequest) -> Result<crate::domain::DigestBody, ApiError>;
}

/// Aggregated local activity sent to the digest call
#[derive(Debug, Clone, Serialize)]
pub struct DigestRequest {
    pub date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub notes: Vec<DigestNote>,
}

/// One note as seen by the digest call
#[derive(Debug, Clone, Serialize)]
pub struct DigestNote {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub status: NoteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub decisions: Vec<InsightItem>,
    pub actions: Vec<InsightItem>,
    pub commitments: Vec<InsightItem>,
    pub unresolved: Vec<InsightItem>,
}

/// Longest transcript excerpt included per note in a digest request
pub const DIGEST_TRANSCRIPT_CHARS: usize = 2_000;

impl DigestRequest {
    /// Render the request as the user message of the digest call
    pub fn render(&self) -> String {
        let mut out = format!(
            "Date: {}\nWindow: {} to {}\nNotes: {}\n",
            self.date,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339(),
            self.notes.len()
        );

        if self.notes.is_empty() {
            out.push_str("\nNo notes were recorded in this window.\n");
            return out;
        }

        for (i, note) in self.notes.iter().enumerate() {
            out.push_str(&format!(
                "\n## {}. {} ({})\n",
                i + 1,
                note.title,
                note.created_at.format("%H:%M")
            ));
            if let Some(text) = &note.transcript {
                out.push_str(&excerpt(text, DIGEST_TRANSCRIPT_CHARS));
                out.push('\n');
            }
            for (heading, items) in [
                ("Decisions", &note.decisions),
                ("Actions", &note.actions),
                ("Commitments", &note.commitments),
                ("Unresolved", &note.unresolved),
            ] {
                if items.is_empty() {
                    continue;
                }
                out.push_str(&format!("{}:\n", heading));
                for item in items {
                    out.push_str(&format!("- {}\n", item.render()));
                }
            }
        }

        out
    }
}

/// Truncate on a char boundary, marking the cut
fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(429, String::new(), Some(30)),
            ApiError::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
        assert!(matches!(
            ApiError::from_status(503, "busy".to_string(), None),
            ApiError::Upstream { status: 503, .. }
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ApiError::NetworkUnavailable("offline".into()).kind(),
            "network_unavailable"
        );
        assert_eq!(
            ApiError::MalformedResponse("x".into()).kind(),
            "malformed_response"
        );
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("  héllo  ", 10), "héllo");
        assert_eq!(excerpt("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn test_render_empty_request() {
        let request = DigestRequest {
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            window_start: Utc::now(),
            window_end: Utc::now(),
            notes: vec![],
        };
        let rendered = request.render();
        assert!(rendered.contains("Date: 2024-03-02"));
        assert!(rendered.contains("No notes were recorded"));
    }
}
