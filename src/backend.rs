//! Text-to-speech synthesis backends.
//!
//! Two backends are supported: the `edge-tts` CLI (free, no key needed) and
//! the OpenAI speech API. Both write an mp3 to a caller-supplied path; the
//! player doesn't care which one produced it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::SpeakError;
use crate::segment;

/// Request timeout and per-request character ceiling for the OpenAI API.
const OPENAI_TIMEOUT_SECS: u64 = 60;
const OPENAI_CHAR_LIMIT: usize = 4000;

pub const DEFAULT_EDGE_VOICE: &str = "en-US-GuyNeural";
pub const DEFAULT_OPENAI_VOICE: &str = "coral";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Edge,
    Openai,
}

impl BackendKind {
    /// Backend selection from `CC_SPEAK_BACKEND`, defaulting to edge-tts.
    pub fn from_env() -> Self {
        std::env::var("CC_SPEAK_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(BackendKind::Edge)
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "edge" => Ok(BackendKind::Edge),
            "openai" => Ok(BackendKind::Openai),
            other => Err(format!("unknown backend '{other}' (expected edge or openai)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Edge => write!(f, "edge"),
            BackendKind::Openai => write!(f, "openai"),
        }
    }
}

/// Voice for a backend: explicit choice, else `CC_SPEAK_VOICE`, else the
/// backend's built-in default.
pub fn resolve_voice(kind: BackendKind, explicit: Option<&str>) -> String {
    if let Some(v) = explicit {
        if !v.is_empty() {
            return v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CC_SPEAK_VOICE") {
        if !v.is_empty() {
            return v;
        }
    }
    match kind {
        BackendKind::Edge => DEFAULT_EDGE_VOICE.to_string(),
        BackendKind::Openai => DEFAULT_OPENAI_VOICE.to_string(),
    }
}

/// `CC_SPEAK_RATE` if set, else the given fallback.
pub fn resolve_rate(fallback: &str) -> String {
    std::env::var("CC_SPEAK_RATE").unwrap_or_else(|_| fallback.to_string())
}

/// `CC_SPEAK_SPEED` if set and parsable, else the given fallback.
pub fn resolve_speed(fallback: f32) -> f32 {
    std::env::var("CC_SPEAK_SPEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// One synthesis request: the text plus the delivery parameters.
#[derive(Debug, Clone)]
pub struct SpeechJob {
    pub text: String,
    pub voice: String,
    /// edge-tts rate adjustment, e.g. `+10%`. Ignored by OpenAI.
    pub rate: String,
    /// OpenAI speed multiplier. Ignored by edge-tts.
    pub speed: f32,
}

#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize `job.text` into an mp3 at `out`.
    async fn synthesize(&self, job: &SpeechJob, out: &Path) -> Result<(), SpeakError>;

    fn name(&self) -> &'static str;
}

/// Backend driving the `edge-tts` command-line tool.
pub struct EdgeTtsBackend {
    program: PathBuf,
}

impl EdgeTtsBackend {
    pub fn new() -> Result<Self, SpeakError> {
        let program = which::which("edge-tts").map_err(|_| SpeakError::MissingDependency {
            tool: "edge-tts".into(),
        })?;
        Ok(Self { program })
    }
}

#[async_trait]
impl SynthesisBackend for EdgeTtsBackend {
    async fn synthesize(&self, job: &SpeechJob, out: &Path) -> Result<(), SpeakError> {
        debug!("edge-tts synthesizing {} chars", job.text.len());
        let output = tokio::process::Command::new(&self.program)
            .arg("--text")
            .arg(&job.text)
            .arg("--voice")
            .arg(&job.voice)
            .arg("--rate")
            .arg(&job.rate)
            .arg("--write-media")
            .arg(out)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeakError::Synthesis(format!(
                "edge-tts exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "edge"
    }
}

/// Backend calling the OpenAI `/v1/audio/speech` endpoint.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new() -> Result<Self, SpeakError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(SpeakError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(OPENAI_TIMEOUT_SECS))
            .build()
            .map_err(|e| SpeakError::Synthesis(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: "gpt-4o-mini-tts".into(),
        })
    }

    async fn request_chunk(&self, text: &str, job: &SpeechJob) -> Result<Vec<u8>, SpeakError> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": job.voice,
            "speed": job.speed,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeakError::Synthesis(format!("OpenAI request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(SpeakError::Synthesis(format!(
                "OpenAI returned {status}: {}",
                detail.trim()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SpeakError::Synthesis(format!("OpenAI response body: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Join per-chunk mp3 files with ffmpeg's concat demuxer, or fall back
    /// to raw byte concatenation when ffmpeg isn't installed.
    async fn concat_parts(parts: &[PathBuf], out: &Path) -> Result<(), SpeakError> {
        if let Ok(ffmpeg) = which::which("ffmpeg") {
            let list = out.with_extension("txt");
            let mut manifest = String::new();
            for part in parts {
                manifest.push_str(&format!("file '{}'\n", part.display()));
            }
            tokio::fs::write(&list, manifest).await?;

            let output = tokio::process::Command::new(&ffmpeg)
                .args(["-y", "-f", "concat", "-safe", "0", "-i"])
                .arg(&list)
                .args(["-c", "copy"])
                .arg(out)
                .output()
                .await?;
            let _ = tokio::fs::remove_file(&list).await;

            if output.status.success() {
                return Ok(());
            }
            warn!("ffmpeg concat failed, falling back to byte append");
        }

        // mp3 frames concatenate tolerably for playback.
        let mut joined = Vec::new();
        for part in parts {
            joined.extend(tokio::fs::read(part).await?);
        }
        tokio::fs::write(out, joined).await?;
        Ok(())
    }
}

#[async_trait]
impl SynthesisBackend for OpenAiBackend {
    async fn synthesize(&self, job: &SpeechJob, out: &Path) -> Result<(), SpeakError> {
        if job.text.len() <= OPENAI_CHAR_LIMIT {
            let bytes = self.request_chunk(&job.text, job).await?;
            tokio::fs::write(out, bytes).await?;
            return Ok(());
        }

        // Long input: split on sentence boundaries and stitch the parts.
        let mut chunks = Vec::new();
        segment::pack_sentences(&job.text, OPENAI_CHAR_LIMIT, &mut chunks);
        debug!("OpenAI input split into {} chunks", chunks.len());

        let mut parts = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let part = out.with_extension(format!("part{i}.mp3"));
            let bytes = self.request_chunk(chunk, job).await?;
            tokio::fs::write(&part, bytes).await?;
            parts.push(part);
        }

        let result = Self::concat_parts(&parts, out).await;
        for part in &parts {
            let _ = tokio::fs::remove_file(part).await;
        }
        result
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Construct the backend for `kind`, verifying its prerequisites.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn SynthesisBackend>, SpeakError> {
    match kind {
        BackendKind::Edge => Ok(Box::new(EdgeTtsBackend::new()?)),
        BackendKind::Openai => Ok(Box::new(OpenAiBackend::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("edge".parse::<BackendKind>().unwrap(), BackendKind::Edge);
        assert_eq!("OpenAI".parse::<BackendKind>().unwrap(), BackendKind::Openai);
        assert!("polly".parse::<BackendKind>().is_err());
    }

    #[test]
    fn explicit_voice_wins() {
        assert_eq!(
            resolve_voice(BackendKind::Edge, Some("en-GB-RyanNeural")),
            "en-GB-RyanNeural"
        );
    }

    #[test]
    fn empty_explicit_voice_falls_through_to_default() {
        // Only meaningful when CC_SPEAK_VOICE is unset in the test env.
        if std::env::var("CC_SPEAK_VOICE").is_err() {
            assert_eq!(resolve_voice(BackendKind::Edge, Some("")), DEFAULT_EDGE_VOICE);
            assert_eq!(
                resolve_voice(BackendKind::Openai, None),
                DEFAULT_OPENAI_VOICE
            );
        }
    }
}
