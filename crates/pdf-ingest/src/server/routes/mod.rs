//! API routes for the ingestion server

pub mod chat;
pub mod queue;
pub mod tasks;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Uploads, with a larger body limit
        .route(
            "/upload",
            post(upload::upload_files).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Tasks
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/:id", get(tasks::get_task).delete(tasks::delete_task))
        // Queue control
        .route("/queue/stats", get(queue::queue_stats))
        .route("/queue/reorder", post(queue::reorder))
        .route("/queue/clear-completed", post(queue::clear_completed))
        .route("/queue/pause", post(queue::pause))
        .route("/queue/resume", post(queue::resume))
        .route("/queue/concurrency", put(queue::set_concurrency))
        // Chat
        .route("/chat", post(chat::chat))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "pdf-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Persistent PDF ingestion queue with bounded-concurrency text extraction",
        "endpoints": {
            "POST /api/upload": "Upload PDFs (multipart) and queue them",
            "GET /api/tasks": "List tasks in display order",
            "GET /api/tasks/:id": "Get one task",
            "DELETE /api/tasks/:id": "Remove a task that is not processing",
            "POST /api/queue/reorder": "Reorder active tasks: { taskIds: [...] }",
            "POST /api/queue/clear-completed": "Remove completed and failed tasks",
            "GET /api/queue/stats": "Queue and task counts",
            "POST /api/queue/pause": "Stop starting new tasks",
            "POST /api/queue/resume": "Start tasks again",
            "PUT /api/queue/concurrency": "Set worker limit: { concurrency: n }",
            "POST /api/chat": "Ask about completed documents (stub)",
            "GET /health": "Health check"
        }
    }))
}
