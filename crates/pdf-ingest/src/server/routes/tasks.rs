//! Task endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::Task;

/// GET /api/tasks - All tasks in display order
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>> {
    Ok(Json(state.service().get_all_tasks()?))
}

/// GET /api/tasks/:id - One task
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>> {
    state
        .service()
        .get_task(id)?
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Task {} not found", id)))
}

/// DELETE /api/tasks/:id - Remove a task that is not processing
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if state.service().remove_task(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found(format!("Task {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::test_client::{api, router};
    use crate::test_support::{touch, wait_until, StubExtractor};
    use crate::types::TaskStatus;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_task_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubExtractor::gated();
        let (router, service) = router(dir.path(), stub.clone());

        let id = service.add_task("a.pdf", touch(dir.path(), "a.pdf")).unwrap();

        let (status, body) = api(&router, "GET", "/api/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], id.to_string());
        assert_eq!(body[0]["displayOrder"], 0);

        assert!(wait_until(|| stub.active() == 1).await);
        assert!(
            wait_until(|| service.get_task(id).unwrap().unwrap().status == TaskStatus::Processing)
                .await
        );
        let uri = format!("/api/tasks/{}", id);
        let (status, body) = api(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "invalid_state");

        stub.release(1);
        assert!(
            wait_until(|| service.get_task(id).unwrap().unwrap().status == TaskStatus::Completed)
                .await
        );

        let (status, body) = api(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["result"]["pageCount"], 3);

        let (status, _) = api(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = api(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found");
        let (status, _) = api(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
