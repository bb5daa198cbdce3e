//! Audio playback through whichever CLI player is installed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SpeakError;

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play the file to completion.
    async fn play(&self, path: &Path) -> Result<(), SpeakError>;

    fn name(&self) -> &str;
}

/// Players probed in order. Flags silence any video/console output so the
/// command blocks for exactly the audio duration.
const CANDIDATES: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("afplay", &[]),
    ("mpv", &["--no-video", "--really-quiet"]),
];

/// A player that shells out to an installed command-line tool.
pub struct CommandPlayer {
    program: PathBuf,
    name: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Probe for a known player on PATH.
    pub fn detect() -> Result<Self, SpeakError> {
        for (name, args) in CANDIDATES {
            if let Ok(program) = which::which(name) {
                debug!("Using audio player {}", program.display());
                return Ok(Self {
                    program,
                    name: name.to_string(),
                    args: args.iter().map(|a| a.to_string()).collect(),
                });
            }
        }
        Err(SpeakError::NoPlayer)
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, path: &Path) -> Result<(), SpeakError> {
        if !path.exists() {
            return Err(SpeakError::FileNotFound(path.to_path_buf()));
        }

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeakError::Playback {
                player: self.name.clone(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
