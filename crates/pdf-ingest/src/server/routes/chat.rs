//! Chat endpoint
//!
//! No model is wired in yet: the reply acknowledges the question and names
//! the completed documents it would be answered from.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::TaskStatus;

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Task ids whose extracted text the question refers to
    #[serde(default)]
    pub mentions: Vec<Uuid>,
}

/// Document a reply draws on
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    pub id: Uuid,
    pub filename: String,
    pub page_count: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub documents: Vec<ChatDocument>,
    /// Mentions that are unknown or not completed
    pub unavailable: Vec<Uuid>,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(Error::invalid_argument("Message cannot be empty"));
    }

    let mut documents = Vec::new();
    let mut unavailable = Vec::new();
    for id in request.mentions {
        match state.service().get_task(id)? {
            Some(task) if task.status == TaskStatus::Completed => {
                let page_count = task.result.as_ref().map(|r| r.page_count).unwrap_or(0);
                documents.push(ChatDocument {
                    id,
                    filename: task.filename,
                    page_count,
                });
            }
            _ => unavailable.push(id),
        }
    }

    let reply = if documents.is_empty() {
        "Received your question. Mention a completed document to ask about its contents."
            .to_string()
    } else {
        let names: Vec<&str> = documents.iter().map(|d| d.filename.as_str()).collect();
        format!(
            "Received your question about {}. Answers are not available yet.",
            names.join(", ")
        )
    };

    tracing::debug!(
        "Chat message ({} chars), {} documents, {} unavailable",
        message.len(),
        documents.len(),
        unavailable.len()
    );

    Ok(Json(ChatResponse {
        reply,
        documents,
        unavailable,
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::test_client::{api, router};
    use crate::test_support::{touch, wait_until, StubExtractor};
    use crate::types::TaskStatus;
    use axum::http::StatusCode;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_chat_names_completed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let (router, service) = router(dir.path(), StubExtractor::instant());

        let done = service.add_task("report.pdf", touch(dir.path(), "report.pdf")).unwrap();
        assert!(
            wait_until(|| service.get_task(done).unwrap().unwrap().status == TaskStatus::Completed)
                .await
        );
        let unknown = Uuid::new_v4();

        let (status, body) = api(
            &router,
            "POST",
            "/api/chat",
            Some(json!({ "message": "What is the total?", "mentions": [done, unknown] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["reply"].as_str().unwrap().contains("report.pdf"));
        assert_eq!(body["documents"][0]["filename"], "report.pdf");
        assert_eq!(body["documents"][0]["pageCount"], 3);
        assert_eq!(body["unavailable"][0], unknown.to_string());

        let (status, _) = api(
            &router,
            "POST",
            "/api/chat",
            Some(json!({ "message": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
