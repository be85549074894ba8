//! Multipart upload endpoint

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::service::IngestService;

/// Response from an upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub task_ids: Vec<Uuid>,
    pub files_queued: usize,
    pub message: String,
}

/// POST /api/upload - Save PDFs under the upload directory and queue each one.
///
/// The whole request is rejected if any file is not a PDF.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut files: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        Error::invalid_argument(format!("Failed to read multipart field: {}", e))
    })? {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field.bytes().await.map_err(|e| {
            Error::invalid_argument(format!("Failed to read {}: {}", filename, e))
        })?;

        if !looks_like_pdf(&filename, &data) {
            return Err(Error::invalid_argument(format!(
                "{} is not a PDF file",
                filename
            )));
        }

        tracing::info!("Received upload: {} ({} bytes)", filename, data.len());
        files.push((filename, data));
    }

    if files.is_empty() {
        return Err(Error::invalid_argument("No files provided"));
    }

    let task_ids = queue_uploads(state.service(), files).await?;

    let files_queued = task_ids.len();
    Ok(Json(UploadResponse {
        task_ids,
        files_queued,
        message: format!("Queued {} file(s) for extraction", files_queued),
    }))
}

/// Save each file and queue it. All or nothing: if one file cannot be
/// queued, the tasks already admitted for this request are removed again.
async fn queue_uploads(service: &IngestService, files: Vec<(String, Bytes)>) -> Result<Vec<Uuid>> {
    let mut saved: Vec<(String, PathBuf)> = Vec::with_capacity(files.len());
    for (filename, data) in files {
        let stored = service
            .upload_dir()
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_filename(&filename)));
        if let Err(e) = tokio::fs::write(&stored, &data).await {
            discard_files(saved.iter().map(|(_, path)| path)).await;
            return Err(e.into());
        }
        saved.push((filename, stored));
    }

    let mut task_ids = Vec::with_capacity(saved.len());
    for (index, (filename, stored)) in saved.iter().enumerate() {
        match service.add_task(filename.as_str(), stored) {
            Ok(id) => task_ids.push(id),
            Err(e) => {
                tracing::warn!(
                    "Failed to queue {}; withdrawing {} task(s) from this upload",
                    filename,
                    task_ids.len()
                );
                for id in &task_ids {
                    if let Err(remove) = service.remove_task(*id) {
                        tracing::warn!("Task {} could not be withdrawn: {}", id, remove);
                    }
                }
                discard_files(saved[index..].iter().map(|(_, path)| path)).await;
                return Err(e);
            }
        }
    }
    Ok(task_ids)
}

async fn discard_files<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn looks_like_pdf(filename: &str, data: &[u8]) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf") && data.starts_with(b"%PDF-")
}

/// Keep the last path component and replace anything unusual
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
