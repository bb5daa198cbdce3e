//! Configuration management for claude-speak-rs.
//!
//! Loads config from YAML files in standard locations; every section has
//! defaults so a missing or partial file still works. CLI flags override
//! whatever the file says.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backend::BackendKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: BackendKind,
    /// Empty means the backend's default voice (or `CC_SPEAK_VOICE`).
    pub voice: String,
    /// edge-tts rate adjustment, e.g. `+10%`.
    pub rate: String,
    /// OpenAI speed multiplier (0.25-4.0).
    pub speed: f32,
    pub strip_code: bool,
    pub strip_paths: bool,
    /// Chunks that clean down to fewer words than this are not spoken.
    pub min_words: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Edge,
            voice: String::new(),
            rate: "+10%".into(),
            speed: 1.0,
            strip_code: true,
            strip_paths: true,
            min_words: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quiet period after the last appended text before a flush.
    pub debounce_ms: u64,
    /// Transcript poll interval.
    pub poll_ms: u64,
    /// How often the active transcript is re-selected.
    pub rescan_secs: u64,
    /// Debounce-flusher poll interval.
    pub flush_poll_ms: u64,
    /// How long shutdown waits for the speech worker to drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            poll_ms: 500,
            rescan_secs: 5,
            flush_poll_ms: 100,
            shutdown_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8910 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub monitor: MonitorConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./claude-speak.yaml
    /// 2. ~/.config/claude-speak/config.yaml
    /// 3. /etc/claude-speak/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir()
                    .ok()
                    .map(|d| d.join("claude-speak.yaml")),
                dirs::home_dir().map(|h| h.join(".config/claude-speak/config.yaml")),
                Some(PathBuf::from("/etc/claude-speak/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {e}, using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {e}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
        }
    }
}
