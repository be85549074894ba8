//! Queue control endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{QueueCounts, QueueStats};

/// Body of POST /api/queue/reorder
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    pub success: bool,
}

/// Body of PUT /api/queue/concurrency
#[derive(Debug, Deserialize)]
pub struct ConcurrencyRequest {
    pub concurrency: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

/// GET /api/queue/stats
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>> {
    Ok(Json(state.service().get_queue_stats()?))
}

/// POST /api/queue/reorder - Full ordering of pending and processing tasks
pub async fn reorder(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>> {
    let success = state.service().reorder_tasks(&request.task_ids)?;
    Ok(Json(ReorderResponse { success }))
}

/// POST /api/queue/clear-completed
pub async fn clear_completed(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let removed = state.service().clear_completed_tasks()?;
    Ok(Json(ClearResponse { removed }))
}

/// POST /api/queue/pause
pub async fn pause(State(state): State<AppState>) -> Result<Json<QueueCounts>> {
    state.service().pause_queue()?;
    Ok(Json(state.service().get_queue_stats()?.queue))
}

/// POST /api/queue/resume
pub async fn resume(State(state): State<AppState>) -> Result<Json<QueueCounts>> {
    state.service().resume_queue()?;
    Ok(Json(state.service().get_queue_stats()?.queue))
}

/// PUT /api/queue/concurrency
pub async fn set_concurrency(
    State(state): State<AppState>,
    Json(request): Json<ConcurrencyRequest>,
) -> Result<Json<QueueCounts>> {
    state.service().set_concurrency(request.concurrency)?;
    Ok(Json(state.service().get_queue_stats()?.queue))
}
