//! Note subcommands.
//!
//! - `add`: record a note from an audio file or typed text
//! - `list`: recent notes with their processing status
//! - `show`: a note's transcript and extracted insights
//! - `retry`: re-run transcription/extraction for a failed note

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use super::{open_coordinator, open_store, truncate};
use crate::audio::read_duration;
use crate::domain::{AudioRef, InsightKind, Note};
use crate::ingest::compute_file_hash;
use crate::refresh::{NoteOutcome, RefreshError};
use crate::store::NoteRepository;

/// Note-related subcommands
#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Record a note and enrich it
    Add {
        /// Audio file to transcribe
        #[arg(short, long, conflicts_with = "text")]
        audio: Option<PathBuf>,

        /// Typed note text (skips transcription)
        #[arg(short, long)]
        text: Option<String>,

        /// Note title
        #[arg(long)]
        title: Option<String>,

        /// Recording length in seconds (read from the file when omitted)
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// List recent notes
    List {
        /// Maximum number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a note with its insights
    Show {
        /// Note ID (full or prefix)
        note_id: String,
    },

    /// Retry a failed note
    Retry {
        /// Note ID (full or prefix)
        note_id: String,
    },
}

pub async fn execute(command: NoteCommands) -> Result<()> {
    match command {
        NoteCommands::Add {
            audio,
            text,
            title,
            duration,
        } => add_note(audio, text, title, duration).await,
        NoteCommands::List { limit } => list_notes(limit).await,
        NoteCommands::Show { note_id } => show_note(&note_id).await,
        NoteCommands::Retry { note_id } => retry_note(&note_id).await,
    }
}

async fn add_note(
    audio: Option<PathBuf>,
    text: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
) -> Result<()> {
    let note = match (audio, text) {
        (Some(path), _) => {
            let metadata = tokio::fs::metadata(&path)
                .await
                .with_context(|| format!("Cannot read audio file {}", path.display()))?;
            let content_hash = compute_file_hash(&path).await?;
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            let title = title.unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "Voice note".to_string())
            });

            let duration_secs = match duration {
                Some(secs) => Some(secs),
                None => read_duration(&path).await,
            };

            Note::from_audio(
                title,
                AudioRef {
                    path: path.canonicalize().unwrap_or(path),
                    mime_type: AudioRef::mime_for_extension(&ext).to_string(),
                    size_bytes: metadata.len(),
                    duration_secs,
                    content_hash,
                },
            )
        }
        (None, Some(text)) => {
            if text.trim().is_empty() {
                bail!("Note text is empty");
            }
            let title = title.unwrap_or_else(|| truncate(&text, 40));
            Note::from_text(title, text)
        }
        (None, None) => bail!("Provide --audio <file> or --text <text>"),
    };

    let coordinator = open_coordinator().await?;
    let note_id = note.id;
    let outcome = coordinator.on_note_saved(note).await;
    report_enrichment(note_id, outcome)
}

/// Print the outcome of enrichment; a failure is an error so the process
/// exits non-zero, after telling the user how to retry
fn report_enrichment(
    note_id: Uuid,
    outcome: Result<NoteOutcome, RefreshError>,
) -> Result<()> {
    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(RefreshError::Store(e)) => Err(e).context("Note could not be saved"),
        Err(e) => {
            eprintln!("Retry with: voxbrief note retry {}", note_id);
            Err(anyhow::Error::new(e).context(format!("Note {} saved but not enriched", note_id)))
        }
    }
}

async fn list_notes(limit: usize) -> Result<()> {
    let store = open_store().await?;
    let notes = store.list_notes().await?;

    if notes.is_empty() {
        println!("No notes yet. Use 'voxbrief note add' to record one.");
        return Ok(());
    }

    println!("{:<10} {:<6} {:<18} {:<40}", "ID", "STATUS", "CREATED", "TITLE");
    println!("{}", "-".repeat(76));

    for note in notes.iter().take(limit) {
        println!(
            "{:<10} {:<6} {:<18} {:<40}",
            &note.id.to_string()[..8],
            note.status.label(),
            note.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&note.title, 40)
        );
    }

    println!("\nTotal: {} notes", notes.len());
    Ok(())
}

async fn show_note(note_id: &str) -> Result<()> {
    let store = open_store().await?;
    let note = find_note(store.as_ref(), note_id).await?;

    println!("Note:    {}", note.id);
    println!("Title:   {}", note.title);
    println!("Status:  {:?}", note.status);
    println!("Created: {}", note.created_at);
    println!("Updated: {}", note.updated_at);
    if let Some(audio) = &note.audio {
        println!("Audio:   {} ({} bytes)", audio.path.display(), audio.size_bytes);
    }
    if let Some(error) = &note.error {
        println!("Error:   {}", error);
    }

    if let Some(transcript) = &note.transcript {
        println!("\nTranscript:\n{}", transcript);
    }

    if let Some(extraction) = store.latest_extraction(note.id).await? {
        for kind in InsightKind::ALL {
            let items = extraction.items(kind);
            if items.is_empty() {
                continue;
            }
            println!("\n{}:", kind.heading());
            for item in items {
                println!("  - {}", item.render());
            }
        }
    }

    Ok(())
}

async fn retry_note(note_id: &str) -> Result<()> {
    let store = open_store().await?;
    let note = find_note(store.as_ref(), note_id).await?;

    let coordinator = open_coordinator().await?;
    let outcome = coordinator.retry_note(note.id).await?;
    print_outcome(&outcome);
    Ok(())
}

/// Resolve a full ID or unique prefix
async fn find_note(store: &dyn NoteRepository, note_id: &str) -> Result<Note> {
    if let Ok(id) = Uuid::parse_str(note_id) {
        return store
            .get_note(id)
            .await?
            .with_context(|| format!("Note not found: {}", note_id));
    }

    let mut matches: Vec<Note> = store
        .list_notes()
        .await?
        .into_iter()
        .filter(|n| n.id.to_string().starts_with(note_id))
        .collect();

    match matches.len() {
        0 => bail!("Note not found: {}", note_id),
        1 => Ok(matches.remove(0)),
        n => bail!("Note ID prefix '{}' is ambiguous ({} matches)", note_id, n),
    }
}

fn print_outcome(outcome: &NoteOutcome) {
    let extraction = &outcome.extraction;
    println!(
        "Note {} enriched{}",
        outcome.note.id,
        if outcome.transcribed { " (transcribed)" } else { "" }
    );
    println!(
        "  {} decisions, {} actions, {} commitments, {} unresolved",
        extraction.decisions.len(),
        extraction.actions.len(),
        extraction.commitments.len(),
        extraction.unresolved.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    #[test]
    fn test_enrichment_failure_is_an_error() {
        let note_id = Uuid::new_v4();
        let outcome = Err(RefreshError::Transcription {
            note_id,
            source: ApiError::NetworkUnavailable("offline".to_string()),
        });

        let err = report_enrichment(note_id, outcome).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("saved but not enriched"));
        assert!(message.contains("offline"));
    }
}
