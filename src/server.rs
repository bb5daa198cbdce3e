//! HTTP settings server.
//!
//! Serves a small embedded settings page plus a JSON API for per-project
//! voice and pause overrides, monitor status and control, and voice
//! previews. Binds loopback only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::backend::{self, BackendKind};
use crate::lock::{self, SystemProbe};
use crate::scope::{self, SettingsStore};

const PROJECT_ACTIVE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

static INDEX_HTML: &str = include_str!("server_index.html");

#[derive(Clone)]
pub struct ServerState {
    store: SettingsStore,
    preview_dir: Arc<tempfile::TempDir>,
}

impl ServerState {
    pub fn new(store: SettingsStore) -> Result<Self, std::io::Error> {
        Ok(Self {
            store,
            preview_dir: Arc::new(tempfile::tempdir()?),
        })
    }
}

// --- Request/Response types ---

#[derive(Serialize)]
struct ProjectEntry {
    key: String,
    path: String,
    voice: Option<String>,
    paused: bool,
    /// Seconds since the newest conversation log was written.
    idle_secs: u64,
}

#[derive(Deserialize)]
struct SettingsQuery {
    /// Encoded project key; absent means global.
    project: Option<String>,
}

#[derive(Serialize)]
struct SettingsResponse {
    voice: Option<String>,
    paused: bool,
}

#[derive(Deserialize)]
struct SettingsUpdate {
    project: Option<String>,
    voice: Option<String>,
    paused: Option<bool>,
}

#[derive(Deserialize)]
struct PreviewRequest {
    voice: String,
    #[serde(default)]
    backend: Option<BackendKind>,
    #[serde(default = "default_preview_text")]
    text: String,
}

fn default_preview_text() -> String {
    "This is how your assistant will sound.".to_string()
}

#[derive(Serialize)]
struct PreviewResponse {
    url: String,
}

#[derive(Deserialize)]
struct StartRequest {
    /// Encoded project key; absent starts a global monitor.
    project: Option<String>,
}

#[derive(Deserialize)]
struct StopRequest {
    pid: u32,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok() -> Self {
        Self {
            status: "ok".into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

/// Build the axum router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/projects", get(handle_projects))
        .route("/api/settings", get(handle_get_settings).post(handle_set_settings))
        .route("/api/status", get(handle_status))
        .route("/api/preview", post(handle_preview))
        .route("/api/monitor/start", post(handle_monitor_start))
        .route("/api/monitor/stop", post(handle_monitor_stop))
        .route("/audio/{file}", get(handle_audio))
        .with_state(state)
}

/// Bind loopback and serve until the process exits.
pub async fn serve(state: ServerState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Settings server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_projects(State(state): State<ServerState>) -> Json<Vec<ProjectEntry>> {
    let mut entries = Vec::new();
    let projects = state.store.projects_dir();
    let Ok(dir) = std::fs::read_dir(&projects) else {
        return Json(entries);
    };

    for entry in dir.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(idle) = newest_log_age(&path) else {
            continue;
        };
        if idle > PROJECT_ACTIVE_WINDOW {
            continue;
        }
        let key = entry.file_name().to_string_lossy().to_string();
        entries.push(ProjectEntry {
            path: scope::decode_key(&key),
            voice: scope::voice_at(&path),
            paused: scope::paused_at(&path),
            idle_secs: idle.as_secs(),
            key,
        });
    }

    entries.sort_by_key(|e| e.idle_secs);
    Json(entries)
}

async fn handle_get_settings(
    State(state): State<ServerState>,
    Query(query): Query<SettingsQuery>,
) -> Json<SettingsResponse> {
    let dir = match &query.project {
        Some(key) => state.store.projects_dir().join(key),
        None => state.store.claude_home().to_path_buf(),
    };
    Json(SettingsResponse {
        voice: scope::voice_at(&dir),
        paused: scope::paused_at(&dir),
    })
}

async fn handle_set_settings(
    State(state): State<ServerState>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SimpleResponse> {
    let dir = match &update.project {
        Some(key) => state.store.projects_dir().join(key),
        None => state.store.claude_home().to_path_buf(),
    };

    if let Some(voice) = &update.voice {
        if let Err(e) = scope::set_voice_at(&dir, voice) {
            return Json(SimpleResponse::err(format!("voice record: {e}")));
        }
    }
    if let Some(paused) = update.paused {
        if let Err(e) = scope::set_paused_at(&dir, paused) {
            return Json(SimpleResponse::err(format!("pause marker: {e}")));
        }
    }
    Json(SimpleResponse::ok())
}

async fn handle_status(State(state): State<ServerState>) -> Json<Vec<lock::MonitorStatus>> {
    Json(lock::list_monitors(&state.store, &SystemProbe))
}

async fn handle_preview(
    State(state): State<ServerState>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, (StatusCode, Json<SimpleResponse>)> {
    let kind = req.backend.unwrap_or(BackendKind::Edge);

    // Cache by content so replaying a voice doesn't re-synthesize.
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    hasher.update(req.voice.as_bytes());
    hasher.update(req.text.as_bytes());
    let digest = hasher.finalize();
    let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    let name = format!("preview_{short}.mp3");
    let out = state.preview_dir.path().join(&name);

    if !out.exists() {
        let tts = backend::create_backend(kind).map_err(|e| {
            (StatusCode::BAD_REQUEST, Json(SimpleResponse::err(e.to_string())))
        })?;
        let job = backend::SpeechJob {
            text: req.text,
            voice: req.voice,
            rate: "+0%".into(),
            speed: 1.0,
        };
        tts.synthesize(&job, &out).await.map_err(|e| {
            warn!("Preview synthesis failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SimpleResponse::err(e.to_string())),
            )
        })?;
    }

    Ok(Json(PreviewResponse {
        url: format!("/audio/{name}"),
    }))
}

async fn handle_audio(
    State(state): State<ServerState>,
    AxumPath(file): AxumPath<String>,
) -> impl IntoResponse {
    // Previews are flat files named by hash; anything else is rejected.
    let safe = file
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if !safe || !file.ends_with(".mp3") {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::read(state.preview_dir.path().join(&file)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_monitor_start(Json(req): Json<StartRequest>) -> Json<SimpleResponse> {
    let program = match monitor_binary() {
        Some(p) => p,
        None => return Json(SimpleResponse::err("claude-speak binary not found")),
    };

    let mut command = std::process::Command::new(&program);
    if let Some(key) = &req.project {
        command.arg("--cwd").arg(scope::decode_key(key));
    }
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    match command.spawn() {
        Ok(child) => {
            info!("Started monitor pid {} ({:?})", child.id(), req.project);
            Json(SimpleResponse::ok())
        }
        Err(e) => Json(SimpleResponse::err(format!("spawn {}: {e}", program.display()))),
    }
}

async fn handle_monitor_stop(
    State(state): State<ServerState>,
    Json(req): Json<StopRequest>,
) -> Json<SimpleResponse> {
    use sysinfo::{Pid, System};

    let system = System::new_all();
    match system.process(Pid::from_u32(req.pid)) {
        Some(process) => {
            if !process.kill() {
                return Json(SimpleResponse::err(format!("could not signal pid {}", req.pid)));
            }
            info!("Stopped monitor pid {}", req.pid);
        }
        None => info!("Monitor pid {} already gone", req.pid),
    }

    // Either way, drop any lock records still naming that pid.
    lock::cleanup_records_for(&state.store, req.pid);
    Json(SimpleResponse::ok())
}

/// The monitor binary: next to the current executable, else on PATH.
fn monitor_binary() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("claude-speak");
            if sibling.exists() {
                return Some(sibling);
            }
        }
    }
    which::which("claude-speak").ok()
}

fn newest_log_age(dir: &std::path::Path) -> Option<Duration> {
    let mut newest: Option<SystemTime> = None;
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "jsonl") {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                newest = Some(newest.map_or(modified, |n| n.max(modified)));
            }
        }
    }
    newest.and_then(|t| t.elapsed().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn state() -> (tempfile::TempDir, ServerState) {
        let home = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(home.path().to_path_buf());
        let state = ServerState::new(store).unwrap();
        (home, state)
    }

    #[tokio::test]
    async fn projects_lists_recent_dirs_with_settings() {
        let (home, state) = state();
        let store = SettingsStore::new(home.path().to_path_buf());
        let project = store.projects_dir().join("-work-demo");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("session.jsonl"), "{}\n").unwrap();
        scope::set_voice_at(&project, "en-GB-SoniaNeural").unwrap();
        scope::set_paused_at(&project, true).unwrap();

        let Json(entries) = handle_projects(State(state)).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "-work-demo");
        assert_eq!(entries[0].path, "/work/demo");
        assert_eq!(entries[0].voice.as_deref(), Some("en-GB-SoniaNeural"));
        assert!(entries[0].paused);
    }

    #[tokio::test]
    async fn projects_skips_dirs_without_recent_logs() {
        let (home, state) = state();
        let store = SettingsStore::new(home.path().to_path_buf());
        let project = store.projects_dir().join("-old-project");
        fs::create_dir_all(&project).unwrap();
        // No jsonl at all.

        let Json(entries) = handle_projects(State(state)).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn settings_roundtrip_global_and_project() {
        let (_home, state) = state();

        let Json(resp) = handle_set_settings(
            State(state.clone()),
            Json(SettingsUpdate {
                project: None,
                voice: Some("coral".into()),
                paused: Some(true),
            }),
        )
        .await;
        assert_eq!(resp.status, "ok");

        let Json(settings) = handle_get_settings(
            State(state.clone()),
            Query(SettingsQuery { project: None }),
        )
        .await;
        assert_eq!(settings.voice.as_deref(), Some("coral"));
        assert!(settings.paused);

        // Clearing with "default" removes the record.
        let Json(_) = handle_set_settings(
            State(state.clone()),
            Json(SettingsUpdate {
                project: None,
                voice: Some("default".into()),
                paused: Some(false),
            }),
        )
        .await;
        let Json(settings) = handle_get_settings(
            State(state),
            Query(SettingsQuery { project: None }),
        )
        .await;
        assert_eq!(settings.voice, None);
        assert!(!settings.paused);
    }

    #[tokio::test]
    async fn audio_rejects_path_traversal() {
        let (_home, state) = state();
        let resp = handle_audio(
            State(state),
            AxumPath("../../etc/passwd".to_string()),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
