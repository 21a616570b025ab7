//! Inbox directory watcher.
//!
//! Audio files dropped into the inbox become notes. A file is imported once
//! its size has been stable for the configured delay, and files whose content
//! hash matches an existing note are skipped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::read_duration;
use crate::config::InboxSettings;
use crate::domain::{AudioRef, Note};
use crate::refresh::{RefreshCoordinator, RefreshError};
use crate::store::{NoteRepository, StoreError};

/// Errors that can occur while scanning or watching the inbox
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("Inbox directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Watcher task failed: {0}")]
    Task(String),
}

/// What happened to one inbox file
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Note created and enriched
    Imported(Uuid),

    /// Note created but enrichment failed; retry later
    Failed { note_id: Uuid, error: String },

    /// Content already belongs to a note
    Duplicate(String),
}

/// Result of a directory scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub imported: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub errors: usize,
}

impl ScanResult {
    pub fn total_scanned(&self) -> usize {
        self.imported + self.failed + self.duplicates + self.errors
    }

    fn count(&mut self, outcome: &ImportOutcome) {
        match outcome {
            ImportOutcome::Imported(_) => self.imported += 1,
            ImportOutcome::Failed { .. } => self.failed += 1,
            ImportOutcome::Duplicate(_) => self.duplicates += 1,
        }
    }
}

/// Imports audio files from the inbox directory
pub struct InboxWatcher {
    settings: InboxSettings,
    coordinator: Arc<RefreshCoordinator>,
}

impl InboxWatcher {
    pub fn new(settings: InboxSettings, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            settings,
            coordinator,
        }
    }

    pub fn settings(&self) -> &InboxSettings {
        &self.settings
    }

    fn validate(&self) -> Result<(), InboxError> {
        if !self.settings.path.is_dir() {
            return Err(InboxError::DirectoryNotFound(self.settings.path.clone()));
        }
        Ok(())
    }

    /// Import every audio file currently in the inbox
    pub async fn scan_once(&self) -> Result<ScanResult, InboxError> {
        self.validate()?;

        let mut known = self.known_hashes().await?;
        let mut result = ScanResult::default();
        let mut paths = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.settings.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_audio_file(&path, &self.settings.extensions) {
                paths.push(path);
            }
        }
        // Import oldest names first so notes keep drop order
        paths.sort();

        for path in paths {
            match self.import(&path, &mut known).await {
                Ok(outcome) => result.count(&outcome),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to import");
                    result.errors += 1;
                }
            }
        }

        Ok(result)
    }

    /// Import one file unless its content is already known
    pub async fn import(
        &self,
        path: &Path,
        known: &mut HashSet<String>,
    ) -> Result<ImportOutcome, InboxError> {
        let metadata = tokio::fs::metadata(path).await?;
        let hash = compute_file_hash(path).await?;

        if !known.insert(hash.clone()) {
            debug!(path = %path.display(), %hash, "Already imported");
            return Ok(ImportOutcome::Duplicate(hash));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| hash.clone());

        let audio = AudioRef {
            path: path.to_path_buf(),
            mime_type: AudioRef::mime_for_extension(&ext).to_string(),
            size_bytes: metadata.len(),
            duration_secs: read_duration(path).await,
            content_hash: hash,
        };
        let note = Note::from_audio(title, audio);
        let note_id = note.id;

        info!(
            path = %path.display(),
            %note_id,
            duration_secs = ?note.audio.as_ref().and_then(|a| a.duration_secs),
            "Importing audio note"
        );
        match self.coordinator.on_note_saved(note).await {
            Ok(_) => Ok(ImportOutcome::Imported(note_id)),
            Err(RefreshError::Store(e)) => Err(e.into()),
            Err(e) => Ok(ImportOutcome::Failed {
                note_id,
                error: e.to_string(),
            }),
        }
    }

    /// Content hashes of audio already attached to notes
    async fn known_hashes(&self) -> Result<HashSet<String>, InboxError> {
        Ok(self
            .coordinator
            .repository()
            .list_notes()
            .await?
            .into_iter()
            .filter_map(|n| n.audio.map(|a| a.content_hash))
            .collect())
    }

    /// Watch the inbox and import files as they become stable.
    ///
    /// Runs until the returned handle is stopped.
    pub fn watch(self) -> Result<(mpsc::Receiver<ImportOutcome>, WatchHandle), InboxError> {
        self.validate()?;

        let (event_tx, event_rx) = mpsc::channel::<ImportOutcome>(100);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            if let Err(e) = self.run_watcher(event_tx, stop_rx).await {
                error!(error = %e, "Inbox watcher error");
            }
        });

        Ok((event_rx, WatchHandle { stop_tx, task }))
    }

    async fn run_watcher(
        &self,
        event_tx: mpsc::Sender<ImportOutcome>,
        mut stop_rx: mpsc::Receiver<()>,
    ) -> Result<(), InboxError> {
        // path -> (size, last_seen)
        let mut pending: HashMap<PathBuf, (u64, Instant)> = HashMap::new();
        let mut known = self.known_hashes().await?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_secs(2), tx)?;
        debouncer
            .watcher()
            .watch(&self.settings.path, RecursiveMode::NonRecursive)?;

        let stability_delay = Duration::from_secs(self.settings.stability_delay_secs);
        info!(path = %self.settings.path.display(), "Watching inbox");

        loop {
            if stop_rx.try_recv().is_ok() {
                info!("Inbox watcher stopping");
                break;
            }

            loop {
                match rx.try_recv() {
                    Ok(Ok(events)) => {
                        for event in events {
                            let path = event.path;
                            if !is_audio_file(&path, &self.settings.extensions) {
                                continue;
                            }
                            if let Ok(metadata) = std::fs::metadata(&path) {
                                if metadata.is_file() {
                                    pending.insert(path, (metadata.len(), Instant::now()));
                                }
                            }
                        }
                    }
                    Ok(Err(e)) => warn!("Notify error: {:?}", e),
                    Err(std::sync::mpsc::TryRecvError::Empty) => break,
                    Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                        return Err(InboxError::Task("notify channel disconnected".to_string()));
                    }
                }
            }

            let now = Instant::now();
            let mut stable = Vec::new();
            for (path, (last_size, last_seen)) in pending.iter_mut() {
                if now.duration_since(*last_seen) < stability_delay {
                    continue;
                }
                match std::fs::metadata(path) {
                    Ok(metadata) if metadata.len() == *last_size && *last_size > 0 => {
                        stable.push(path.clone());
                    }
                    Ok(metadata) => {
                        // Still growing
                        *last_size = metadata.len();
                        *last_seen = now;
                    }
                    Err(_) => stable.push(path.clone()),
                }
            }

            for path in stable {
                pending.remove(&path);
                if !path.exists() {
                    continue;
                }
                match self.import(&path, &mut known).await {
                    Ok(outcome) => {
                        let _ = event_tx.send(outcome).await;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to import"),
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Ok(())
    }
}

/// Handle to stop a running watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    pub async fn stop(self) -> Result<(), InboxError> {
        let _ = self.stop_tx.send(()).await;
        self.task
            .await
            .map_err(|e| InboxError::Task(e.to_string()))
    }
}

fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// SHA256 of a file's content (first 12 hex chars)
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize())[..12].to_string())
}
