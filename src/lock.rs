//! Single-instance lock per monitored scope.
//!
//! A lock record (`speech-monitor.pid`) holds the owning process id. A
//! record naming a dead process is stale and may be overwritten; only the
//! owner removes its own record on shutdown, so a newer monitor's record is
//! never clobbered by an older one exiting late.

use std::fs;
use std::path::PathBuf;

use sysinfo::System;
use tracing::{debug, warn};

use crate::scope::{decode_key, Scope, SettingsStore, LOCK_FILE};

/// Process liveness capability. Platform specifics live behind this seam.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the system process table.
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let sys = System::new_all();
        sys.process(sysinfo::Pid::from_u32(pid)).is_some()
    }
}

/// Outcome of an acquisition attempt. Contention is a normal result, not an
/// error.
#[derive(Debug, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    HeldBy { pid: u32 },
}

pub struct MonitorLock {
    path: PathBuf,
    pid: u32,
}

impl MonitorLock {
    pub fn new(store: &SettingsStore, scope: &Scope) -> Self {
        Self {
            path: store.config_dir(scope).join(LOCK_FILE),
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Try to take the lock. A missing or unparsable record is stale, as is
    /// one naming a dead process; both are overwritten.
    pub fn acquire(&self, probe: &dyn ProcessProbe) -> Acquire {
        if let Some(owner) = read_pid(&self.path) {
            if owner != self.pid && probe.is_alive(owner) {
                return Acquire::HeldBy { pid: owner };
            }
        }

        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create lock dir {}: {e}", parent.display());
            }
        }
        if let Err(e) = fs::write(&self.path, self.pid.to_string()) {
            // Non-fatal: the monitor still runs, just unguarded.
            warn!("Failed to write lock record {}: {e}", self.path.display());
        }
        Acquire::Acquired
    }

    /// Remove the record, but only while it still names this process.
    pub fn release(&self) {
        match read_pid(&self.path) {
            Some(owner) if owner == self.pid => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("Failed to remove lock record {}: {e}", self.path.display());
                } else {
                    debug!("Released lock {}", self.path.display());
                }
            }
            _ => {}
        }
    }
}

fn read_pid(path: &PathBuf) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse().ok()
}

/// A monitor discovered via its lock record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MonitorStatus {
    /// Decoded project path; `None` for the global monitor.
    pub project: Option<String>,
    pub pid: u32,
    pub running: bool,
}

/// List all lock records under the store, with liveness.
pub fn list_monitors(store: &SettingsStore, probe: &dyn ProcessProbe) -> Vec<MonitorStatus> {
    let mut monitors = Vec::new();

    if let Some(pid) = read_pid(&store.claude_home().join(LOCK_FILE)) {
        monitors.push(MonitorStatus {
            project: None,
            pid,
            running: probe.is_alive(pid),
        });
    }

    let Ok(entries) = fs::read_dir(store.projects_dir()) else {
        return monitors;
    };
    for entry in entries.flatten() {
        let lock_path = entry.path().join(LOCK_FILE);
        if let Some(pid) = read_pid(&lock_path) {
            monitors.push(MonitorStatus {
                project: Some(decode_key(&entry.file_name().to_string_lossy())),
                pid,
                running: probe.is_alive(pid),
            });
        }
    }

    monitors
}

/// Remove every lock record naming `pid`. Used after force-stopping a
/// monitor, whose own release never ran.
pub fn cleanup_records_for(store: &SettingsStore, pid: u32) {
    let mut paths = vec![store.claude_home().join(LOCK_FILE)];
    if let Ok(entries) = fs::read_dir(store.projects_dir()) {
        paths.extend(entries.flatten().map(|e| e.path().join(LOCK_FILE)));
    }

    for path in paths {
        if read_pid(&path) == Some(pid) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to clean up lock record {}: {e}", path.display());
            }
        }
    }
}
