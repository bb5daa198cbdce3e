//! Serialized synthesis and playback.
//!
//! A single worker task owns the backend and player, so utterances never
//! overlap. Producers push raw text chunks; the worker cleans each one at
//! dequeue time, re-checks the pause marker and voice override, synthesizes
//! to a temp file, plays it, and deletes the file. A failed chunk is logged
//! and dropped so one bad utterance can't stall the queue.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{SpeechJob, SynthesisBackend};
use crate::normalize::{normalize, NormalizeOptions};
use crate::player::AudioPlayer;
use crate::scope::SettingsStore;

enum QueueItem {
    Chunk(String),
    Shutdown,
}

/// Cheap handle for pushing chunks onto the queue from any task.
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl ChunkSender {
    /// Enqueue a raw text chunk. Returns false once the worker is gone.
    pub fn enqueue(&self, text: String) -> bool {
        self.tx.send(QueueItem::Chunk(text)).is_ok()
    }
}

/// Per-dequeue settings lookup.
///
/// Holds the settings store plus a shared slot naming the project config dir
/// of whichever conversation is currently active, so a global monitor honors
/// the right project's pause marker and voice even as the active project
/// changes mid-queue.
pub struct OverrideResolver {
    store: Option<SettingsStore>,
    active_dir: Arc<Mutex<Option<PathBuf>>>,
}

impl OverrideResolver {
    pub fn new(store: Option<SettingsStore>, active_dir: Option<PathBuf>) -> Self {
        Self {
            store,
            active_dir: Arc::new(Mutex::new(active_dir)),
        }
    }

    /// Shared slot for the active project config dir; the monitor updates it
    /// when the active conversation switches projects.
    pub fn active_dir_handle(&self) -> Arc<Mutex<Option<PathBuf>>> {
        Arc::clone(&self.active_dir)
    }

    fn is_paused(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let dir = self.active_dir.lock().unwrap_or_else(|e| e.into_inner()).clone();
        store.is_paused_in(dir.as_deref())
    }

    fn voice(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        let dir = self.active_dir.lock().unwrap_or_else(|e| e.into_inner()).clone();
        store.voice_override_in(dir.as_deref())
    }
}

/// Delivery parameters applied to every utterance.
pub struct SpeechOptions {
    /// Default voice when no override file is set.
    pub voice: String,
    pub rate: String,
    pub speed: f32,
    /// Chunks that clean down to fewer words than this are skipped.
    pub min_words: usize,
    pub normalize: NormalizeOptions,
}

pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    worker: JoinHandle<()>,
}

impl SpeechQueue {
    /// Start the worker task.
    pub fn spawn(
        backend: Box<dyn SynthesisBackend>,
        player: Box<dyn AudioPlayer>,
        resolver: OverrideResolver,
        options: SpeechOptions,
    ) -> Result<Self, std::io::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let workdir = tempfile::tempdir()?;
        let worker = tokio::spawn(worker_loop(rx, backend, player, resolver, options, workdir));
        Ok(Self { tx, worker })
    }

    pub fn sender(&self) -> ChunkSender {
        ChunkSender { tx: self.tx.clone() }
    }

    /// Ask the worker to finish the queued chunks and exit, waiting up to
    /// `timeout` before abandoning it.
    pub async fn shutdown(self, timeout: Duration) {
        let _ = self.tx.send(QueueItem::Shutdown);
        if tokio::time::timeout(timeout, self.worker).await.is_err() {
            warn!("Speech worker did not drain within {timeout:?}, abandoning");
        }
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    backend: Box<dyn SynthesisBackend>,
    player: Box<dyn AudioPlayer>,
    resolver: OverrideResolver,
    options: SpeechOptions,
    workdir: tempfile::TempDir,
) {
    let mut serial = 0u64;
    while let Some(item) = rx.recv().await {
        let raw = match item {
            QueueItem::Chunk(text) => text,
            QueueItem::Shutdown => break,
        };

        if resolver.is_paused() {
            debug!("Speech paused, dropping chunk");
            continue;
        }

        let text = normalize(&raw, options.normalize);
        if text.split_whitespace().count() < options.min_words {
            debug!("Chunk too short after cleaning, skipping");
            continue;
        }

        let job = SpeechJob {
            text,
            voice: resolver.voice().unwrap_or_else(|| options.voice.clone()),
            rate: options.rate.clone(),
            speed: options.speed,
        };

        serial += 1;
        let audio = workdir.path().join(format!("speech_{serial}.mp3"));

        if let Err(e) = backend.synthesize(&job, &audio).await {
            warn!("Synthesis failed ({}): {e}", backend.name());
            let _ = std::fs::remove_file(&audio);
            continue;
        }
        if let Err(e) = player.play(&audio).await {
            warn!("Playback failed ({}): {e}", player.name());
        }
        let _ = std::fs::remove_file(&audio);
    }
    debug!("Speech worker exiting");
}
