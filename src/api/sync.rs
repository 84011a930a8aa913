//! Sync API endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{success, ApiResult};
use crate::models::{SyncRequest, SyncRun};
use crate::sync::ProgressEvent;
use crate::AppState;

/// POST /api/sync - Trigger a sync run and wait for its outcome.
///
/// Returns 409 when another run holds the single-flight guard. Progress is
/// observable from `GET /api/sync/status` while this request is in flight.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<SyncRun> {
    let run = state.sync.run(request).await?;
    success(run)
}

/// Progress snapshot returned by the status endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressEvent>,
}

/// GET /api/sync/status - Latest progress event of the current/last run.
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<SyncStatus> {
    let progress = state.sync.progress_snapshot();
    success(SyncStatus {
        idle: progress.is_none(),
        progress,
    })
}

/// GET /api/sync/runs - Recent sync runs, newest first.
pub async fn list_sync_runs(State(state): State<AppState>) -> ApiResult<Vec<SyncRun>> {
    let runs = state.repo.list_sync_runs(50).await?;
    success(runs)
}
