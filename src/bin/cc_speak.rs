//! cc-speak: speak a file or stdin once, or follow a growing text file.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claude_speak::backend::{self, BackendKind, SpeechJob};
use claude_speak::normalize::{normalize, NormalizeOptions};
use claude_speak::player::{AudioPlayer, CommandPlayer};
use claude_speak::segment::{extract_chunks, PendingBuffer};
use claude_speak::speech::{OverrideResolver, SpeechOptions, SpeechQueue};
use claude_speak::tailer::FileTailer;

const FOLLOW_DEBOUNCE: Duration = Duration::from_millis(2000);
const FOLLOW_POLL: Duration = Duration::from_millis(100);
const FOLLOW_DRAIN: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "cc-speak", about = "Speak text from a file or stdin")]
struct Args {
    /// Input file; `-` or absent reads stdin
    file: Option<PathBuf>,

    /// Keep following the file as it grows (stdin: speak lines as they arrive)
    #[arg(short, long)]
    follow: bool,

    /// Speak the text verbatim, skipping all cleaning
    #[arg(long)]
    raw: bool,

    /// Keep code blocks instead of replacing them with a placeholder
    #[arg(long)]
    keep_code: bool,

    /// Keep file paths instead of dropping them
    #[arg(long)]
    keep_paths: bool,

    /// Print the cleaned text instead of speaking it
    #[arg(short, long)]
    preview: bool,

    /// Save audio to this file instead of playing it
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TTS backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Voice name
    #[arg(long)]
    voice: Option<String>,

    /// edge-tts rate adjustment, e.g. +10%
    #[arg(long)]
    rate: Option<String>,

    /// OpenAI speed multiplier
    #[arg(long)]
    speed: Option<f32>,

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
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let kind = args.backend.unwrap_or_else(BackendKind::from_env);
    let voice = backend::resolve_voice(kind, args.voice.as_deref());
    let rate = args
        .rate
        .clone()
        .unwrap_or_else(|| backend::resolve_rate("+0%"));
    let speed = args.speed.unwrap_or_else(|| backend::resolve_speed(1.0));
    let options = NormalizeOptions {
        strip_code: !args.keep_code,
        strip_paths: !args.keep_paths,
    };

    if args.follow {
        return follow(&args, kind, voice, rate, speed, options).await;
    }

    let raw_text = read_input(args.file.as_deref())?;
    let text = if args.raw {
        raw_text
    } else {
        normalize(&raw_text, options)
    };

    if text.trim().is_empty() {
        eprintln!("Nothing to speak");
        return Ok(());
    }

    if args.preview {
        println!("{text}");
        return Ok(());
    }

    let tts = backend::create_backend(kind)?;
    let job = SpeechJob {
        text,
        voice,
        rate,
        speed,
    };

    match &args.output {
        Some(out) => {
            tts.synthesize(&job, out).await?;
            println!("Wrote {}", out.display());
        }
        None => {
            let player = CommandPlayer::detect()?;
            let dir = tempfile::tempdir()?;
            let audio = dir.path().join("speech.mp3");
            tts.synthesize(&job, &audio).await?;
            player.play(&audio).await?;
        }
    }
    Ok(())
}

fn read_input(file: Option<&std::path::Path>) -> std::io::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path),
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Tail a growing file (or stdin) and speak appended text with the same
/// debounce and segmentation the monitor uses.
async fn follow(
    args: &Args,
    kind: BackendKind,
    voice: String,
    rate: String,
    speed: f32,
    options: NormalizeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let tts = backend::create_backend(kind)?;
    let player = CommandPlayer::detect()?;
    let queue = SpeechQueue::spawn(
        tts,
        Box::new(player),
        OverrideResolver::new(None, None),
        SpeechOptions {
            voice,
            rate,
            speed,
            min_words: 3,
            normalize: options,
        },
    )?;
    let sender = queue.sender();

    let mut pending = PendingBuffer::new();
    let flush_ripe = |pending: &mut PendingBuffer, force: bool| {
        if force || pending.is_ripe(FOLLOW_DEBOUNCE) {
            let text = pending.take();
            for chunk in extract_chunks(&text) {
                sender.enqueue(chunk);
            }
        }
    };

    match args.file.as_deref().filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            if !path.exists() {
                std::fs::write(path, "")?;
            }
            info!("Following {}", path.display());
            let mut tailer = FileTailer::from_end(path.to_path_buf());
            let mut tick = tokio::time::interval(FOLLOW_POLL);
            let mut since_read = Duration::ZERO;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = tick.tick() => {
                        since_read += FOLLOW_POLL;
                        if since_read >= Duration::from_millis(500) {
                            since_read = Duration::ZERO;
                            if let Some(text) = tailer.read_new() {
                                pending.append(&text);
                            }
                        }
                        flush_ripe(&mut pending, false);
                    }
                }
            }
        }
        None => {
            // Blocking stdin reader feeding the async loop.
            let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
            std::thread::spawn(move || {
                for line in std::io::stdin().lines() {
                    match line {
                        Ok(line) => {
                            if line_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            });

            let mut tick = tokio::time::interval(FOLLOW_POLL);
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    line = line_rx.recv() => {
                        match line {
                            Some(line) => pending.append(&line),
                            None => break, // EOF
                        }
                    }
                    _ = tick.tick() => flush_ripe(&mut pending, false),
                }
            }
        }
    }

    flush_ripe(&mut pending, true);
    queue.shutdown(FOLLOW_DRAIN).await;
    Ok(())
}
