use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::get,
    Router,
};
use lexdesk_core::{
    format::{format_file_size, is_accepted, progress_percent, stage_checklist, status_label, StageMark},
    stages::{get_stage, Stage},
    RawFile, UploadCounts, UploadEvent, UploadedFile,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::AppState;

const SSE_KEEPALIVE_SECS: u64 = 15;

// ── Response types ────────────────────────────────────────────────────────

/// An upload record plus everything the list view renders for it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadView {
    #[serde(flatten)]
    pub file: UploadedFile,
    pub size_label: String,
    pub percent: u8,
    pub status_label: &'static str,
    /// Name of `currentStage`, `None` before the first tick.
    pub stage_name: Option<&'static str>,
    pub stages: Vec<StageMark>,
}

impl From<UploadedFile> for UploadView {
    fn from(file: UploadedFile) -> Self {
        Self {
            size_label: format_file_size(file.size),
            percent: progress_percent(file.progress),
            status_label: status_label(file.status),
            stage_name: get_stage(file.current_stage).map(|s| s.name),
            stages: stage_checklist(file.current_stage),
            file,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct SubmitResponse {
    pub accepted: Vec<UploadView>,
    pub rejected: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusResponse {
    #[serde(flatten)]
    pub counts: UploadCounts,
    pub in_flight: usize,
    pub uptime_secs: u64,
}

// ── Router ────────────────────────────────────────────────────────────────

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Catalog
        .route("/api/stages", get(list_stages))
        // Uploads
        .route("/api/uploads", get(list_uploads).post(submit_uploads))
        .route("/api/uploads/:id", get(get_upload).delete(remove_upload))
        // Status
        .route("/api/status", get(get_status))
        // SSE
        .route("/api/events", get(sse_events))
        .route("/api/logs", get(sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_stages(State(state): State<Arc<AppState>>) -> Json<&'static [Stage]> {
    Json(state.simulator.stages())
}

async fn list_uploads(State(state): State<Arc<AppState>>) -> Json<Vec<UploadView>> {
    Json(state.simulator.list().into_iter().map(UploadView::from).collect())
}

/// Submits the files whose extension the chooser would offer; reports the rest.
async fn submit_uploads(
    State(state): State<Arc<AppState>>,
    Json(files): Json<Vec<RawFile>>,
) -> (StatusCode, Json<SubmitResponse>) {
    let (accepted, rejected): (Vec<RawFile>, Vec<RawFile>) =
        files.into_iter().partition(|f| is_accepted(&f.name));
    let rejected: Vec<String> = rejected.into_iter().map(|f| f.name).collect();
    if !rejected.is_empty() {
        info!("skipping {} file(s) with unsupported extension", rejected.len());
    }

    let created = state.simulator.submit(accepted);
    let status = if created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(SubmitResponse {
            accepted: created.into_iter().map(UploadView::from).collect(),
            rejected,
        }),
    )
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UploadView>, StatusCode> {
    state
        .simulator
        .get(&id)
        .map(|file| Json(file.into()))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn remove_upload(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    state.simulator.remove(&id);
    StatusCode::NO_CONTENT
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        counts: state.simulator.counts(),
        in_flight: state.simulator.in_flight().len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// SSE

async fn sse_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.simulator.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let frame = event_frame(&msg.ok()?).ok()?;
        Some(Ok::<Event, Infallible>(frame))
    });
    Sse::new(stream).keep_alive(keep_alive())
}

async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.log_tx.subscribe();
    let history = log_history(&state.log_ring);
    let replay =
        tokio_stream::iter(history).map(|line| Ok::<Event, Infallible>(Event::default().data(line)));
    let live = BroadcastStream::new(rx)
        .filter_map(|msg| msg.ok().map(|data| Ok::<Event, Infallible>(Event::default().data(data))));
    Sse::new(replay.chain(live)).keep_alive(keep_alive())
}

/// SSE frame for one upload event. A frame that cannot be encoded is logged and skipped.
fn event_frame(event: &UploadEvent) -> Result<Event, StatusCode> {
    let data = serde_json::to_string(event).map_err(internal)?;
    Ok(Event::default().event(event.kind()).data(data))
}

fn log_history(ring: &Mutex<VecDeque<String>>) -> Vec<String> {
    ring.lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect()
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(std::time::Duration::from_secs(SSE_KEEPALIVE_SECS))
        .text("ping")
}
