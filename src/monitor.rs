//! Transcript-watching orchestration.
//!
//! Ties the pieces together: pick the active conversation log, tail it,
//! deduplicate assistant messages, debounce the text into chunks, and feed
//! the speech queue. In project mode the watched directory is fixed; in
//! global mode the most recently modified log across all projects wins, and
//! the monitor follows it as it moves between projects.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::SynthesisBackend;
use crate::player::AudioPlayer;
use crate::scope::{Scope, SettingsStore};
use crate::segment::{extract_chunks, PendingBuffer};
use crate::speech::{ChunkSender, OverrideResolver, SpeechOptions, SpeechQueue};
use crate::tailer::{self, FileTailer};
use crate::transcript;

pub struct MonitorOptions {
    /// Watch only this project's conversations; `None` watches everything.
    pub cwd: Option<PathBuf>,
    pub debounce: Duration,
    pub poll: Duration,
    pub rescan: Duration,
    pub flush_poll: Duration,
    pub shutdown_timeout: Duration,
}

pub struct SpeechMonitor {
    store: SettingsStore,
    options: MonitorOptions,
    queue: Option<SpeechQueue>,
    sender: ChunkSender,
    pending: Arc<Mutex<PendingBuffer>>,
    active_dir: Arc<Mutex<Option<PathBuf>>>,
    running: Arc<AtomicBool>,
    flusher: Option<JoinHandle<()>>,
    tailer: Option<FileTailer>,
    seen: HashSet<String>,
}

impl SpeechMonitor {
    pub fn new(
        store: SettingsStore,
        backend: Box<dyn SynthesisBackend>,
        player: Box<dyn AudioPlayer>,
        speech: SpeechOptions,
        options: MonitorOptions,
    ) -> Result<Self, std::io::Error> {
        // In project mode the override dir never changes; in global mode the
        // worker reads whatever dir the watch loop last recorded. The dir is
        // a pure path join: it may not exist yet, and the override lookups
        // tolerate that, so a monitor started before the project's first
        // session still honors markers written later.
        let initial_dir = options
            .cwd
            .clone()
            .map(|cwd| store.config_dir(&Scope::Project(cwd)));
        let resolver = OverrideResolver::new(Some(store.clone()), initial_dir);
        let active_dir = resolver.active_dir_handle();

        let queue = SpeechQueue::spawn(backend, player, resolver, speech)?;
        let sender = queue.sender();
        let pending = Arc::new(Mutex::new(PendingBuffer::new()));
        let running = Arc::new(AtomicBool::new(true));

        let flusher = tokio::spawn(flush_loop(
            Arc::clone(&pending),
            sender.clone(),
            Arc::clone(&running),
            options.debounce,
            options.flush_poll,
        ));

        Ok(Self {
            store,
            options,
            queue: Some(queue),
            sender,
            pending,
            active_dir,
            running,
            flusher: Some(flusher),
            tailer: None,
            seen: HashSet::new(),
        })
    }

    /// Watch until `shutdown` resolves, then drain and stop.
    pub async fn run(&mut self, shutdown: impl std::future::Future<Output = ()>) {
        match &self.options.cwd {
            Some(cwd) => info!("Monitoring conversations for {}", cwd.display()),
            None => info!("Monitoring all projects"),
        }

        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(self.options.poll);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_rescan: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => {
                    let due = last_rescan
                        .map(|t| t.elapsed() >= self.options.rescan)
                        .unwrap_or(true);
                    if due || self.tailer.is_none() {
                        self.reselect();
                        last_rescan = Some(Instant::now());
                    }
                    self.drain_tailer();
                }
            }
        }

        self.stop().await;
    }

    /// Re-pick the active transcript; on a switch, start tailing it from the
    /// end so history is not replayed.
    fn reselect(&mut self) {
        let target = match &self.options.cwd {
            Some(cwd) => tailer::project_dir_for(&self.store, cwd)
                .and_then(|dir| tailer::latest_jsonl_in(&dir)),
            None => tailer::active_jsonl_global(&self.store),
        };

        let Some(path) = target else {
            return;
        };
        if self.tailer.as_ref().is_some_and(|t| t.path() == path) {
            return;
        }

        info!("Now watching {}", path.display());
        if self.options.cwd.is_none() {
            let dir = path.parent().map(|p| p.to_path_buf());
            *self.active_dir.lock().unwrap_or_else(|e| e.into_inner()) = dir;
        }
        self.tailer = Some(FileTailer::from_end(path));
    }

    fn drain_tailer(&mut self) {
        let Some(tailer) = &mut self.tailer else {
            return;
        };
        let Some(new_text) = tailer.read_new() else {
            return;
        };

        let mut appended = 0usize;
        for line in new_text.lines() {
            let Some(message) = transcript::parse_line(line) else {
                continue;
            };
            if let Some(id) = &message.identity {
                if !self.seen.insert(id.clone()) {
                    continue;
                }
            }
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.append(&message.text);
            appended += 1;
        }
        if appended > 0 {
            debug!("Buffered {appended} new assistant messages");
        }
    }

    /// Flush whatever is pending regardless of the debounce window, then
    /// wait for the queue to finish speaking.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(flusher) = self.flusher.take() {
            let _ = flusher.await;
        }

        let leftover = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.take()
        };
        if !leftover.is_empty() {
            for chunk in extract_chunks(&leftover) {
                self.sender.enqueue(chunk);
            }
        }

        if let Some(queue) = self.queue.take() {
            info!("Draining speech queue");
            queue.shutdown(self.options.shutdown_timeout).await;
        }
    }
}

/// Debounce flusher: once the buffer has been quiet for the debounce window,
/// segment it and hand the chunks to the queue.
async fn flush_loop(
    pending: Arc<Mutex<PendingBuffer>>,
    sender: ChunkSender,
    running: Arc<AtomicBool>,
    debounce: Duration,
    flush_poll: Duration,
) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(flush_poll).await;
        let ripe = {
            let mut buffer = pending.lock().unwrap_or_else(|e| e.into_inner());
            if buffer.is_ripe(debounce) {
                Some(buffer.take())
            } else {
                None
            }
        };
        if let Some(text) = ripe {
            for chunk in extract_chunks(&text) {
                if !sender.enqueue(chunk) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SpeechJob, SynthesisBackend};
    use crate::error::SpeakError;
    use crate::normalize::NormalizeOptions;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    struct RecordingBackend(Arc<StdMutex<Vec<String>>>);

    #[async_trait]
    impl SynthesisBackend for RecordingBackend {
        async fn synthesize(&self, job: &SpeechJob, out: &Path) -> Result<(), SpeakError> {
            self.0.lock().unwrap().push(job.text.clone());
            fs::write(out, b"mp3")?;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct SilentPlayer;

    #[async_trait]
    impl AudioPlayer for SilentPlayer {
        async fn play(&self, _path: &Path) -> Result<(), SpeakError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    fn assistant_line(id: &str, text: &str) -> String {
        format!(
            r#"{{"type":"assistant","uuid":"u-{id}","message":{{"id":"{id}","content":[{{"type":"text","text":"{text}"}}]}}}}"#
        )
    }

    fn fast_options(cwd: Option<PathBuf>) -> MonitorOptions {
        MonitorOptions {
            cwd,
            debounce: Duration::from_millis(100),
            poll: Duration::from_millis(20),
            rescan: Duration::from_millis(50),
            flush_poll: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    fn speech_options() -> SpeechOptions {
        SpeechOptions {
            voice: "test-voice".into(),
            rate: "+0%".into(),
            speed: 1.0,
            min_words: 3,
            normalize: NormalizeOptions::default(),
        }
    }

    #[tokio::test]
    async fn speaks_new_messages_and_dedups_by_id() {
        let home = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(home.path().to_path_buf());
        let cwd = PathBuf::from("/work/demo");
        let project = store.projects_dir().join(crate::scope::encode_cwd(&cwd));
        fs::create_dir_all(&project).unwrap();
        let log = project.join("session.jsonl");
        fs::write(&log, "").unwrap();

        let spoken = Arc::new(StdMutex::new(Vec::new()));
        let mut monitor = SpeechMonitor::new(
            store,
            Box::new(RecordingBackend(Arc::clone(&spoken))),
            Box::new(SilentPlayer),
            speech_options(),
            fast_options(Some(cwd)),
        )
        .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let log_for_writer = log.clone();
        let writer = tokio::spawn(async move {
            // Let the monitor pick up the file before appending.
            tokio::time::sleep(Duration::from_millis(80)).await;
            let mut contents = String::new();
            contents.push_str(&assistant_line("msg-1", "I am checking the failing test now."));
            contents.push('\n');
            // Duplicate id, must not be spoken twice.
            contents.push_str(&assistant_line("msg-1", "I am checking the failing test now."));
            contents.push('\n');
            let existing = fs::read_to_string(&log_for_writer).unwrap();
            fs::write(&log_for_writer, existing + &contents).unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            let _ = stop_tx.send(());
        });

        monitor
            .run(async move {
                let _ = stop_rx.await;
            })
            .await;
        writer.await.unwrap();

        let spoken = spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("checking the failing test"));
    }

    #[tokio::test]
    async fn pending_text_is_flushed_on_stop() {
        let home = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(home.path().to_path_buf());
        let cwd = PathBuf::from("/work/demo");
        let project = store.projects_dir().join(crate::scope::encode_cwd(&cwd));
        fs::create_dir_all(&project).unwrap();
        let log = project.join("session.jsonl");
        fs::write(&log, "").unwrap();

        let spoken = Arc::new(StdMutex::new(Vec::new()));
        let mut monitor = SpeechMonitor::new(
            store,
            Box::new(RecordingBackend(Arc::clone(&spoken))),
            Box::new(SilentPlayer),
            speech_options(),
            // Debounce far longer than the test, so only the stop flush
            // can deliver the text.
            MonitorOptions {
                debounce: Duration::from_secs(60),
                ..fast_options(Some(cwd))
            },
        )
        .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let log_for_writer = log.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let line = assistant_line("msg-9", "One last thing before shutting down.");
            let existing = fs::read_to_string(&log_for_writer).unwrap();
            fs::write(&log_for_writer, existing + &line + "\n").unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            let _ = stop_tx.send(());
        });

        monitor
            .run(async move {
                let _ = stop_rx.await;
            })
            .await;
        writer.await.unwrap();

        let spoken = spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("before shutting down"));
    }

    #[tokio::test]
    async fn pause_marker_honored_when_project_dir_appears_after_start() {
        let home = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(home.path().to_path_buf());
        let cwd = PathBuf::from("/work/demo");
        let project = store.projects_dir().join(crate::scope::encode_cwd(&cwd));

        // Monitor starts before the project has ever had a session.
        let spoken = Arc::new(StdMutex::new(Vec::new()));
        let mut monitor = SpeechMonitor::new(
            store,
            Box::new(RecordingBackend(Arc::clone(&spoken))),
            Box::new(SilentPlayer),
            speech_options(),
            fast_options(Some(cwd)),
        )
        .unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            fs::create_dir_all(&project).unwrap();
            let log = project.join("session.jsonl");
            fs::write(&log, "").unwrap();
            // Let the monitor start tailing the new log before pausing.
            tokio::time::sleep(Duration::from_millis(120)).await;
            crate::scope::set_paused_at(&project, true).unwrap();
            let line = assistant_line("msg-2", "This project is paused and must stay silent.");
            let existing = fs::read_to_string(&log).unwrap();
            fs::write(&log, existing + &line + "\n").unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            let _ = stop_tx.send(());
        });

        monitor
            .run(async move {
                let _ = stop_rx.await;
            })
            .await;
        writer.await.unwrap();

        assert!(spoken.lock().unwrap().is_empty());
    }
}
