//! Error types for the speech pipeline.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("{tool} not found on PATH")]
    MissingDependency { tool: String },

    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("playback failed ({player}): {message}")]
    Playback { player: String, message: String },

    #[error("no audio player found (install ffplay, mpv, or afplay)")]
    NoPlayer,

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
