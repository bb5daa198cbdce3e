//! Incremental tailing of growing transcript files.
//!
//! A [`FileTailer`] remembers a byte offset and returns only content appended
//! past it. Truncation (file now smaller than the offset) snaps the offset
//! forward to the new end: overwritten content is gone and is never re-read
//! as if it were new. Selection helpers find the "active" transcript, the
//! most recently modified one, for scoped and global monitoring.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::scope::{encode_cwd, SettingsStore};

/// Tracks a read offset into one append-only file.
#[derive(Debug)]
pub struct FileTailer {
    path: PathBuf,
    offset: u64,
}

impl FileTailer {
    /// Tail from the file's current end, skipping existing history.
    pub fn from_end(path: PathBuf) -> Self {
        let offset = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, offset }
    }

    /// Tail from the beginning of the file.
    pub fn from_start(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever was appended since the last call. Returns `None` when
    /// there is nothing new. A missing file is a transient condition, not an
    /// error; the caller just polls again later.
    pub fn read_new(&mut self) -> Option<String> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return None,
        };

        if size < self.offset {
            debug!(
                "{} truncated ({} -> {size} bytes), snapping offset forward",
                self.path.display(),
                self.offset
            );
            self.offset = size;
            return None;
        }
        if size == self.offset {
            return None;
        }

        let mut file = File::open(&self.path).ok()?;
        file.seek(SeekFrom::Start(self.offset)).ok()?;
        let mut content = String::new();
        file.read_to_string(&mut content).ok()?;

        self.offset += content.len() as u64;
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Most recently modified `.jsonl` file in one project directory.
pub fn latest_jsonl_in(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .max_by_key(|p| mtime(p))
}

/// The project transcript directory for a working directory, if it exists
/// yet. Claude creates it on first use, so absence just means "retry later".
pub fn project_dir_for(store: &SettingsStore, cwd: &Path) -> Option<PathBuf> {
    let dir = store.projects_dir().join(encode_cwd(cwd));
    dir.is_dir().then_some(dir)
}

/// The active transcript across all projects: the newest `.jsonl` inside the
/// most recently modified project directory.
pub fn active_jsonl_global(store: &SettingsStore) -> Option<PathBuf> {
    let entries = fs::read_dir(store.projects_dir()).ok()?;
    let latest_dir = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .max_by_key(|p| mtime(p))?;
    latest_jsonl_in(&latest_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn reads_only_appended_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "first line\n").unwrap();

        let mut tailer = FileTailer::from_end(path.clone());
        assert_eq!(tailer.read_new(), None);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "second line").unwrap();

        assert_eq!(tailer.read_new().as_deref(), Some("second line\n"));
        assert_eq!(tailer.read_new(), None);
    }

    #[test]
    fn from_start_reads_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, "history").unwrap();

        let mut tailer = FileTailer::from_start(path);
        assert_eq!(tailer.read_new().as_deref(), Some("history"));
    }

    #[test]
    fn truncation_snaps_offset_to_new_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, vec![b'x'; 500]).unwrap();

        let mut tailer = FileTailer::from_end(path.clone());
        assert_eq!(tailer.offset(), 500);

        fs::write(&path, vec![b'y'; 200]).unwrap();
        assert_eq!(tailer.read_new(), None);
        assert_eq!(tailer.offset(), 200);

        // Content appended after the truncation point is picked up.
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"tail").unwrap();
        assert_eq!(tailer.read_new().as_deref(), Some("tail"));
    }

    #[test]
    fn missing_file_is_transient() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-yet.txt");

        let mut tailer = FileTailer::from_end(path.clone());
        assert_eq!(tailer.read_new(), None);

        fs::write(&path, "appeared").unwrap();
        assert_eq!(tailer.read_new().as_deref(), Some("appeared"));
    }

    #[test]
    fn latest_jsonl_picks_newest() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.jsonl");
        let new = dir.path().join("new.jsonl");
        fs::write(&old, "a").unwrap();
        fs::write(&new, "b").unwrap();

        let older = SystemTime::now() - std::time::Duration::from_secs(600);
        let file = fs::OpenOptions::new().write(true).open(&old).unwrap();
        file.set_modified(older).unwrap();

        assert_eq!(latest_jsonl_in(dir.path()), Some(new));
    }

    #[test]
    fn non_jsonl_files_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("speech-voice"), "coral").unwrap();
        assert_eq!(latest_jsonl_in(dir.path()), None);
    }

    #[test]
    fn global_selection_walks_project_dirs() {
        let root = TempDir::new().unwrap();
        let store = SettingsStore::new(root.path().to_path_buf());
        let proj = store.projects_dir().join("-w-app");
        fs::create_dir_all(&proj).unwrap();
        fs::write(proj.join("session.jsonl"), "x").unwrap();

        assert_eq!(active_jsonl_global(&store), Some(proj.join("session.jsonl")));
    }
}
