//! claude-speak: background monitor that reads Claude Code's replies aloud.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claude_speak::backend::{self, BackendKind};
use claude_speak::config::Config;
use claude_speak::lock::{Acquire, MonitorLock, SystemProbe};
use claude_speak::monitor::{MonitorOptions, SpeechMonitor};
use claude_speak::normalize::NormalizeOptions;
use claude_speak::player::{AudioPlayer, CommandPlayer};
use claude_speak::scope::{Scope, SettingsStore};
use claude_speak::speech::SpeechOptions;

#[derive(Parser, Debug)]
#[command(name = "claude-speak", about = "Reads Claude Code's replies aloud")]
struct Args {
    /// Project directory to monitor (defaults to all projects)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// TTS backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Voice name (edge-tts or OpenAI voice, depending on backend)
    #[arg(long)]
    voice: Option<String>,

    /// edge-tts rate adjustment, e.g. +10%
    #[arg(long)]
    rate: Option<String>,

    /// Quiet period before buffered text is spoken, in milliseconds
    #[arg(long)]
    debounce: Option<u64>,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("claude-speak starting");
    let config = Config::load(args.config.as_deref());

    let store = SettingsStore::default_location().ok_or("could not determine home directory")?;

    let cwd = match args.cwd {
        Some(dir) => Some(dir.canonicalize().unwrap_or(dir)),
        None => None,
    };
    let scope = Scope::from_cwd(cwd.clone());

    // One monitor per scope; a stale record from a dead process is reclaimed.
    let lock = MonitorLock::new(&store, &scope);
    if let Acquire::HeldBy { pid } = lock.acquire(&SystemProbe) {
        eprintln!("Another monitor is already running for this scope (pid {pid})");
        std::process::exit(1);
    }

    let kind = args
        .backend
        .unwrap_or_else(|| match config.speech.backend {
            BackendKind::Edge => BackendKind::from_env(),
            other => other,
        });
    let voice = backend::resolve_voice(
        kind,
        args.voice.as_deref().or(Some(config.speech.voice.as_str())),
    );
    let rate = args
        .rate
        .unwrap_or_else(|| backend::resolve_rate(&config.speech.rate));
    let speed = backend::resolve_speed(config.speech.speed);

    let tts = backend::create_backend(kind)?;
    let player = CommandPlayer::detect()?;
    info!(
        "Backend: {}, voice: {voice}, player: {}",
        tts.name(),
        player.name()
    );

    let speech = SpeechOptions {
        voice,
        rate,
        speed,
        min_words: config.speech.min_words,
        normalize: NormalizeOptions {
            strip_code: config.speech.strip_code,
            strip_paths: config.speech.strip_paths,
        },
    };
    let options = MonitorOptions {
        cwd,
        debounce: Duration::from_millis(args.debounce.unwrap_or(config.monitor.debounce_ms)),
        poll: Duration::from_millis(config.monitor.poll_ms),
        rescan: Duration::from_secs(config.monitor.rescan_secs),
        flush_poll: Duration::from_millis(config.monitor.flush_poll_ms),
        shutdown_timeout: Duration::from_secs(config.monitor.shutdown_timeout_secs),
    };

    let mut monitor = SpeechMonitor::new(store, tts, Box::new(player), speech, options)?;
    monitor.run(shutdown_signal()).await;

    lock.release();
    info!("claude-speak stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
