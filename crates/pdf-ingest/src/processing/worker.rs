//! Per-task worker: runs one extraction and records the outcome

use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Task, TaskPatch, TaskResult};

use super::file_tier::{extraction_timeout, FileTier, PdfAnalysis};
use super::queue::QueueEngine;

impl QueueEngine {
    /// Worker body for one task. Always frees its slot; a task that could
    /// not be marked processing goes back to the head of the pending list.
    pub(super) async fn run_worker(&self, id: Uuid) {
        match self.process_task(id).await {
            Ok(()) => self.finish_worker(id),
            Err(e @ Error::InvalidState(_)) => {
                tracing::warn!("Task {} is no longer pending: {}", id, e);
                self.finish_worker(id);
            }
            Err(e) => {
                tracing::error!("Failed to mark task {} as processing: {}", id, e);
                self.retry_worker(id);
            }
        }
    }

    /// Errors only when the start write fails. Later failures are recorded
    /// on the task itself.
    async fn process_task(&self, id: Uuid) -> Result<()> {
        let store = &self.inner.store;

        if !store.update_task(id, TaskPatch::start())? {
            tracing::warn!("Task {} disappeared before it could start", id);
            return Ok(());
        }

        let task = match store.get_task(id) {
            Ok(Some(task)) => task,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::error!("Failed to load task {}: {}", id, e);
                return Ok(());
            }
        };

        tracing::info!("Processing task {} ({})", task.id, task.filename);
        let patch = match self.extract(&task).await {
            Ok(result) => {
                tracing::info!(
                    "Task {} completed: {} pages, {} chars in {}ms",
                    task.id,
                    result.page_count,
                    result.text.len(),
                    result.duration_ms
                );
                TaskPatch::complete(result)
            }
            Err(e) => {
                tracing::error!("Task {} ({}) failed: {}", task.id, task.filename, e);
                TaskPatch::fail(e.to_string())
            }
        };

        if let Err(e) = store.update_task(id, patch) {
            tracing::error!("Failed to record outcome of task {}: {}", id, e);
        }
        Ok(())
    }

    async fn extract(&self, task: &Task) -> Result<TaskResult> {
        let file_size = tokio::fs::metadata(&task.path)
            .await
            .map_err(|e| Error::extraction(&task.filename, format!("File unavailable: {}", e)))?
            .len();

        let limit = self.timeout_for(task, file_size).await;
        let start = Instant::now();

        // On timeout the blocking extraction is abandoned, not cancelled
        let extraction = match timeout(limit, self.inner.extractor.extract(&task.path)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!(
                    "TIMEOUT extracting '{}' after {:.1}s (limit: {}s, size: {} bytes)",
                    task.filename,
                    start.elapsed().as_secs_f64(),
                    limit.as_secs(),
                    file_size
                );
                return Err(Error::extraction(
                    &task.filename,
                    format!("Extraction timed out after {}s", limit.as_secs()),
                ));
            }
        };

        Ok(TaskResult {
            text: extraction.text,
            page_count: extraction.page_count,
            file_size,
            metadata: extraction.metadata,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn timeout_for(&self, task: &Task, file_size: u64) -> Duration {
        let config = &self.inner.options.extraction;
        if !config.tiered {
            return extraction_timeout(file_size, &PdfAnalysis::default(), config);
        }

        let analysis = match tokio::fs::read(&task.path).await {
            Ok(data) => PdfAnalysis::analyze(&data),
            Err(_) => PdfAnalysis::default(),
        };
        let limit = extraction_timeout(file_size, &analysis, config);
        tracing::debug!(
            "Task {} tier {} ({} bytes), timeout {}s",
            task.id,
            FileTier::classify(file_size, &analysis),
            file_size,
            limit.as_secs()
        );
        limit
    }
}
