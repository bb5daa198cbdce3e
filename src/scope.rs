//! Scope keys and per-scope override records.
//!
//! Claude Code stores conversation logs under `~/.claude/projects/<key>/`
//! where the key is the project's working directory flattened into a
//! filesystem-safe name. Speech overrides live beside the logs: a
//! `speech-paused` marker file (existence means paused) and a `speech-voice`
//! file whose trimmed content is the override voice. Global overrides sit
//! directly in `~/.claude/`. Project settings win over global ones.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const PAUSE_MARKER: &str = "speech-paused";
pub const VOICE_FILE: &str = "speech-voice";
pub const LOCK_FILE: &str = "speech-monitor.pid";

/// The unit of configuration isolation: one project directory, or the
/// catch-all global context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Global,
    Project(PathBuf),
}

impl Scope {
    pub fn from_cwd(cwd: Option<PathBuf>) -> Self {
        match cwd {
            Some(path) => Self::Project(path),
            None => Self::Global,
        }
    }
}

/// Flatten a working-directory path into a project key:
/// `C:\Projects\MyApp` -> `C--Projects-MyApp`, `/home/me/app` -> `-home-me-app`.
pub fn encode_cwd(cwd: &Path) -> String {
    let raw = cwd.to_string_lossy();
    let trimmed = raw.trim_end_matches(['/', '\\']);
    let source = if trimmed.is_empty() { raw.as_ref() } else { trimmed };
    source
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '-',
            other => other,
        })
        .collect()
}

/// Best-effort reverse of [`encode_cwd`] for display purposes.
pub fn decode_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('-').collect();

    // Drive-letter pattern: `C--Projects-MyApp` decodes as a Windows path.
    // Only applies on Windows; elsewhere such keys fall through to the
    // slash-separated form.
    if cfg!(windows) && parts.len() >= 3 && parts[0].len() == 1 && parts[0].chars().all(|c| c.is_ascii_alphabetic()) && parts[1].is_empty() {
        let rest: Vec<&str> = parts[2..].iter().copied().filter(|p| !p.is_empty()).collect();
        return format!("{}:\\{}", parts[0], rest.join("\\"));
    }

    let rest: Vec<&str> = parts.iter().copied().filter(|p| !p.is_empty()).collect();
    format!("/{}", rest.join("/"))
}

/// Paths and override records rooted at a Claude home directory
/// (`~/.claude` in production, a temp dir in tests).
#[derive(Debug, Clone)]
pub struct SettingsStore {
    claude_home: PathBuf,
}

impl SettingsStore {
    pub fn new(claude_home: PathBuf) -> Self {
        Self { claude_home }
    }

    /// Store rooted at the real `~/.claude`.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".claude")))
    }

    pub fn claude_home(&self) -> &Path {
        &self.claude_home
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.claude_home.join("projects")
    }

    /// Config directory for a scope: the project's log directory, or the
    /// Claude home itself for the global scope.
    pub fn config_dir(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Global => self.claude_home.clone(),
            Scope::Project(cwd) => self.projects_dir().join(encode_cwd(cwd)),
        }
    }

    /// Pause check against an explicit project config dir (the active
    /// project in global mode), falling back to the global marker.
    pub fn is_paused_in(&self, project_dir: Option<&Path>) -> bool {
        if let Some(dir) = project_dir {
            if dir.join(PAUSE_MARKER).exists() {
                return true;
            }
        }
        self.claude_home.join(PAUSE_MARKER).exists()
    }

    /// Voice override against an explicit project config dir, falling back
    /// to the global record. Empty or unreadable records mean no override.
    pub fn voice_override_in(&self, project_dir: Option<&Path>) -> Option<String> {
        if let Some(dir) = project_dir {
            if let Some(voice) = read_voice_file(&dir.join(VOICE_FILE)) {
                return Some(voice);
            }
        }
        read_voice_file(&self.claude_home.join(VOICE_FILE))
    }

    pub fn is_paused(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Global => self.is_paused_in(None),
            Scope::Project(_) => self.is_paused_in(Some(&self.config_dir(scope))),
        }
    }

    pub fn voice_override(&self, scope: &Scope) -> Option<String> {
        match scope {
            Scope::Global => self.voice_override_in(None),
            Scope::Project(_) => self.voice_override_in(Some(&self.config_dir(scope))),
        }
    }

    /// Write or clear the pause marker for a scope.
    pub fn set_paused(&self, scope: &Scope, paused: bool) -> std::io::Result<()> {
        set_paused_at(&self.config_dir(scope), paused)
    }

    /// Write or clear the voice override for a scope. An empty name or
    /// `"default"` clears the record.
    pub fn set_voice(&self, scope: &Scope, voice: &str) -> std::io::Result<()> {
        set_voice_at(&self.config_dir(scope), voice)
    }
}

/// Pause marker in one config dir, no global fallback.
pub fn paused_at(dir: &Path) -> bool {
    dir.join(PAUSE_MARKER).exists()
}

/// Voice override record in one config dir, no global fallback.
pub fn voice_at(dir: &Path) -> Option<String> {
    read_voice_file(&dir.join(VOICE_FILE))
}

pub fn set_paused_at(dir: &Path, paused: bool) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let marker = dir.join(PAUSE_MARKER);
    if paused {
        fs::write(&marker, b"")?;
    } else if marker.exists() {
        fs::remove_file(&marker)?;
    }
    Ok(())
}

pub fn set_voice_at(dir: &Path, voice: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let record = dir.join(VOICE_FILE);
    if voice.is_empty() || voice == "default" {
        if record.exists() {
            fs::remove_file(&record)?;
        }
    } else {
        fs::write(&record, voice)?;
    }
    Ok(())
}

fn read_voice_file(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(content) => {
            let voice = content.trim();
            if voice.is_empty() {
                None
            } else {
                Some(voice.to_string())
            }
        }
        Err(e) => {
            warn!("Failed to read voice override {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SettingsStore) {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn encode_flattens_separators() {
        assert_eq!(encode_cwd(Path::new("/home/me/app")), "-home-me-app");
        assert_eq!(encode_cwd(Path::new(r"C:\Projects\MyApp")), "C--Projects-MyApp");
    }

    #[test]
    fn encode_drops_trailing_separator() {
        assert_eq!(encode_cwd(Path::new("/home/me/app/")), "-home-me-app");
    }

    #[test]
    fn decode_round_trips_unix_paths() {
        assert_eq!(decode_key("-home-me-app"), "/home/me/app");
    }

    #[cfg(windows)]
    #[test]
    fn decode_recognizes_drive_letters() {
        assert_eq!(decode_key("C--Projects-MyApp"), r"C:\Projects\MyApp");
    }

    #[cfg(not(windows))]
    #[test]
    fn decode_treats_drive_letter_keys_as_unix_paths() {
        assert_eq!(decode_key("C--Projects-MyApp"), "/C/Projects/MyApp");
    }

    #[test]
    fn project_pause_beats_global() {
        let (_dir, store) = store();
        let scope = Scope::Project(PathBuf::from("/w/app"));
        assert!(!store.is_paused(&scope));

        store.set_paused(&scope, true).unwrap();
        assert!(store.is_paused(&scope));
        assert!(!store.is_paused(&Scope::Global));
    }

    #[test]
    fn global_pause_applies_to_projects() {
        let (_dir, store) = store();
        store.set_paused(&Scope::Global, true).unwrap();
        assert!(store.is_paused(&Scope::Project(PathBuf::from("/w/app"))));

        store.set_paused(&Scope::Global, false).unwrap();
        assert!(!store.is_paused(&Scope::Project(PathBuf::from("/w/app"))));
    }

    #[test]
    fn voice_precedence_project_then_global() {
        let (_dir, store) = store();
        let scope = Scope::Project(PathBuf::from("/w/app"));

        assert_eq!(store.voice_override(&scope), None);

        store.set_voice(&Scope::Global, "en-US-JennyNeural").unwrap();
        assert_eq!(store.voice_override(&scope).as_deref(), Some("en-US-JennyNeural"));

        store.set_voice(&scope, "en-GB-RyanNeural").unwrap();
        assert_eq!(store.voice_override(&scope).as_deref(), Some("en-GB-RyanNeural"));
        assert_eq!(store.voice_override(&Scope::Global).as_deref(), Some("en-US-JennyNeural"));
    }

    #[test]
    fn empty_voice_record_clears_override() {
        let (_dir, store) = store();
        store.set_voice(&Scope::Global, "coral").unwrap();
        store.set_voice(&Scope::Global, "default").unwrap();
        assert_eq!(store.voice_override(&Scope::Global), None);
    }

    #[test]
    fn whitespace_only_voice_is_no_override() {
        let (_dir, store) = store();
        fs::create_dir_all(store.claude_home()).unwrap();
        fs::write(store.claude_home().join(VOICE_FILE), "  \n").unwrap();
        assert_eq!(store.voice_override(&Scope::Global), None);
    }
}
