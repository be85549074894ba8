//! Service facade over the task store and queue engine

use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{Extractor, PdfExtractor};
use crate::processing::{EngineOptions, QueueEngine};
use crate::storage::{JsonTaskStore, TaskStore};
use crate::types::{QueueStats, Task, TaskCounts};

/// Entry point for callers of the ingestion queue.
///
/// Holds no state of its own: every call goes to the engine or the store.
#[derive(Clone)]
pub struct IngestService {
    engine: QueueEngine,
    store: Arc<dyn TaskStore>,
    upload_dir: PathBuf,
}

impl IngestService {
    /// Open the JSON store from `config`, recover unfinished work and start
    /// the workers with the PDF extractor
    pub fn open(config: &IngestConfig) -> Result<Self> {
        let upload_dir = config.storage.upload_path();
        std::fs::create_dir_all(&upload_dir).map_err(|e| {
            Error::Config(format!(
                "Failed to create upload directory {}: {}",
                upload_dir.display(),
                e
            ))
        })?;

        let store = Arc::new(JsonTaskStore::open(config.storage.db_path())?);
        let service = Self::new(
            store,
            Arc::new(PdfExtractor::new()),
            EngineOptions::from_config(config),
            upload_dir,
        )?;
        service.engine.start();
        Ok(service)
    }

    /// Compose a service from parts. Workers start on the first admission or
    /// when [`IngestService::start`] is called.
    pub fn new(
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn Extractor>,
        options: EngineOptions,
        upload_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let engine = QueueEngine::new(store.clone(), extractor, options)?;
        Ok(Self {
            engine,
            store,
            upload_dir: upload_dir.into(),
        })
    }

    /// Start workers for recovered tasks
    pub fn start(&self) {
        self.engine.start();
    }

    /// Directory uploads are saved to
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Queue the file at `path`; it must exist now
    pub fn add_task(&self, filename: impl Into<String>, path: impl Into<PathBuf>) -> Result<Uuid> {
        let filename = filename.into();
        let path = path.into();
        if !path.is_file() {
            return Err(Error::not_found(format!(
                "File for '{}' not found at {}",
                filename,
                path.display()
            )));
        }
        Ok(self.engine.add_task(filename, path)?.id)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.engine.get_task(id)
    }

    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.engine.get_all_tasks()
    }

    /// Remove a task and its stored upload. False when the id is unknown.
    pub fn remove_task(&self, id: Uuid) -> Result<bool> {
        match self.engine.remove_task(id)? {
            Some(task) => {
                self.discard_upload(&task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove completed and failed tasks, returning how many went
    pub fn clear_completed_tasks(&self) -> Result<usize> {
        let removed = self.engine.clear_completed_tasks()?;
        for task in &removed {
            self.discard_upload(task);
        }
        Ok(removed.len())
    }

    pub fn reorder_tasks(&self, ids: &[Uuid]) -> Result<bool> {
        self.engine.reorder_tasks(ids)?;
        Ok(true)
    }

    pub fn set_concurrency(&self, concurrency: usize) -> Result<()> {
        self.engine.set_concurrency(concurrency)
    }

    pub fn pause_queue(&self) -> Result<()> {
        self.engine.pause()
    }

    pub fn resume_queue(&self) -> Result<()> {
        self.engine.resume()
    }

    pub fn get_queue_stats(&self) -> Result<QueueStats> {
        let queue = self.engine.counts();
        let tasks = TaskCounts::from_tasks(&self.store.get_all_tasks()?);
        Ok(QueueStats { queue, tasks })
    }

    pub fn is_healthy(&self) -> bool {
        self.engine.is_healthy()
    }

    /// Delete the task's file if it was saved by the upload endpoint.
    /// Files queued from elsewhere are left alone.
    fn discard_upload(&self, task: &Task) {
        if !task.path.starts_with(&self.upload_dir) {
            return;
        }
        match std::fs::remove_file(&task.path) {
            Ok(()) => tracing::debug!("Deleted upload {}", task.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete upload {}: {}", task.path.display(), e),
        }
    }
}
