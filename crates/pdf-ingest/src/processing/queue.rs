//! Queue engine: admission, bounded-concurrency scheduling and recovery
//!
//! The task store is the source of truth for task records. The engine only
//! keeps the in-memory pending list and the set of in-flight task ids, and
//! rebuilds both from the store when it is constructed.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{ExtractionConfig, IngestConfig, MAX_CONCURRENCY};
use crate::error::{Error, Result};
use crate::ingestion::Extractor;
use crate::storage::TaskStore;
use crate::types::{QueueCounts, QueueSettings, Task, TaskPatch, TaskStatus};

/// Wait before retrying a task whose start could not be recorded
const START_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Engine tuning taken from the config
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Worker limit used when the store has no saved settings
    pub concurrency: usize,
    /// Largest value `set_concurrency` accepts, never above [`MAX_CONCURRENCY`]
    pub max_concurrency: usize,
    /// Extraction timeouts
    pub extraction: ExtractionConfig,
    /// Slack past the longest extraction timeout before the pool counts as stalled
    pub stall_grace: Duration,
}

impl EngineOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            concurrency: config.queue.concurrency,
            max_concurrency: config.queue.max_concurrency.min(MAX_CONCURRENCY),
            extraction: config.extraction.clone(),
            stall_grace: Duration::from_secs(config.queue.stall_grace_secs),
        }
    }

    /// Effective upper bound for the worker limit
    fn ceiling(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Scheduler state guarded by one lock
struct Scheduler {
    pending: VecDeque<Uuid>,
    in_flight: HashSet<Uuid>,
    concurrency: usize,
    paused: bool,
    last_progress: Instant,
}

impl Scheduler {
    fn settings(&self) -> QueueSettings {
        QueueSettings {
            concurrency: self.concurrency,
            paused: self.paused,
        }
    }
}

pub(super) struct EngineInner {
    pub(super) store: Arc<dyn TaskStore>,
    pub(super) extractor: Arc<dyn Extractor>,
    pub(super) options: EngineOptions,
    scheduler: Mutex<Scheduler>,
}

/// Owns scheduling for the ingestion queue
#[derive(Clone)]
pub struct QueueEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl QueueEngine {
    /// Build an engine over `store`, recovering state left by a previous run.
    ///
    /// Tasks still marked processing were interrupted mid-extraction: they
    /// are reset to pending and placed ahead of every other pending task.
    /// Nothing runs until [`QueueEngine::start`] or the next admission.
    pub fn new(
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn Extractor>,
        options: EngineOptions,
    ) -> Result<Self> {
        let settings = store.settings()?.unwrap_or(QueueSettings {
            concurrency: options.concurrency,
            paused: false,
        });
        let concurrency = settings.concurrency.clamp(1, options.ceiling());

        let interrupted = store.get_tasks_by_status(TaskStatus::Processing)?;
        for task in &interrupted {
            tracing::warn!(
                "Recovering task {} ({}) interrupted while processing",
                task.id,
                task.filename
            );
            store.update_task(task.id, TaskPatch::requeue())?;
        }

        let recovered: HashSet<Uuid> = interrupted.iter().map(|t| t.id).collect();
        let mut pending: VecDeque<Uuid> = interrupted.iter().map(|t| t.id).collect();
        pending.extend(
            store
                .get_tasks_by_status(TaskStatus::Pending)?
                .into_iter()
                .map(|t| t.id)
                .filter(|id| !recovered.contains(id)),
        );

        tracing::info!(
            "Queue engine ready: {} pending ({} recovered), concurrency {}, paused {}, extractor {}",
            pending.len(),
            recovered.len(),
            concurrency,
            settings.paused,
            extractor.name()
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                extractor,
                options,
                scheduler: Mutex::new(Scheduler {
                    pending,
                    in_flight: HashSet::new(),
                    concurrency,
                    paused: settings.paused,
                    last_progress: Instant::now(),
                }),
            }),
        })
    }

    /// Start workers for whatever is pending. Must run inside a tokio runtime.
    pub fn start(&self) {
        self.schedule();
    }

    /// Admit a new task at the back of the pending list
    pub fn add_task(&self, filename: impl Into<String>, path: impl Into<PathBuf>) -> Result<Task> {
        let task = {
            let mut sched = self.inner.scheduler.lock();
            let order = self.inner.store.next_display_order()?;
            let task = self.inner.store.add_task(Task::new(filename, path, order))?;
            sched.pending.push_back(task.id);
            task
        };

        tracing::info!(
            "Queued task {} ({}) at position {}",
            task.id,
            task.filename,
            task.display_order
        );
        self.schedule();
        Ok(task)
    }

    /// Get a task by id
    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.inner.store.get_task(id)
    }

    /// All tasks in display order
    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.inner.store.get_all_tasks()
    }

    /// Remove a task that is not being processed
    pub fn remove_task(&self, id: Uuid) -> Result<Option<Task>> {
        let mut sched = self.inner.scheduler.lock();

        let processing = sched.in_flight.contains(&id)
            || matches!(
                self.inner.store.get_task(id)?,
                Some(Task { status: TaskStatus::Processing, .. })
            );
        if processing {
            return Err(Error::invalid_state(format!(
                "Task {} is processing; wait for it to finish before removing it",
                id
            )));
        }

        let removed = self.inner.store.remove_task(id)?;
        if removed.is_some() {
            sched.pending.retain(|pending| *pending != id);
            tracing::info!("Removed task {}", id);
        }
        Ok(removed)
    }

    /// Remove every completed or failed task
    pub fn clear_completed_tasks(&self) -> Result<Vec<Task>> {
        let removed = self.inner.store.clear_completed_tasks()?;
        if !removed.is_empty() {
            tracing::info!("Cleared {} finished tasks", removed.len());
        }
        Ok(removed)
    }

    /// Reorder the active tasks; `ids` must list each of them exactly once
    pub fn reorder_tasks(&self, ids: &[Uuid]) -> Result<()> {
        let mut sched = self.inner.scheduler.lock();
        self.inner.store.reorder_tasks(ids)?;

        let position: HashMap<Uuid, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        sched
            .pending
            .make_contiguous()
            .sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));

        tracing::info!("Reordered {} active tasks", ids.len());
        Ok(())
    }

    /// Change the worker limit
    pub fn set_concurrency(&self, concurrency: usize) -> Result<()> {
        let max = self.inner.options.ceiling();
        if concurrency < 1 || concurrency > max {
            return Err(Error::invalid_argument(format!(
                "Concurrency must be between 1 and {}, got {}",
                max, concurrency
            )));
        }

        {
            let mut sched = self.inner.scheduler.lock();
            let settings = QueueSettings {
                concurrency,
                ..sched.settings()
            };
            self.inner.store.save_settings(settings)?;
            tracing::info!("Concurrency changed {} -> {}", sched.concurrency, concurrency);
            sched.concurrency = concurrency;
        }

        self.schedule();
        Ok(())
    }

    /// Stop starting new workers; running ones finish
    pub fn pause(&self) -> Result<()> {
        self.set_paused(true)
    }

    /// Start workers again
    pub fn resume(&self) -> Result<()> {
        self.set_paused(false)?;
        self.schedule();
        Ok(())
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        let mut sched = self.inner.scheduler.lock();
        if sched.paused == paused {
            return Ok(());
        }
        let settings = QueueSettings {
            paused,
            ..sched.settings()
        };
        self.inner.store.save_settings(settings)?;
        sched.paused = paused;
        tracing::info!("Queue {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    /// Current queue settings
    pub fn settings(&self) -> QueueSettings {
        self.inner.scheduler.lock().settings()
    }

    /// Pending task ids in the order they will start
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.inner.scheduler.lock().pending.iter().copied().collect()
    }

    /// Scheduler counters
    pub fn counts(&self) -> QueueCounts {
        let sched = self.inner.scheduler.lock();
        QueueCounts {
            length: sched.pending.len(),
            working: sched.in_flight.len(),
            concurrency: sched.concurrency,
            paused: sched.paused,
        }
    }

    /// False when the store is unreachable or the worker pool looks stuck
    pub fn is_healthy(&self) -> bool {
        if let Err(e) = self.inner.store.health_check() {
            tracing::warn!("Health check failed: {}", e);
            return false;
        }

        let sched = self.inner.scheduler.lock();
        if sched.concurrency == 0 {
            return false;
        }

        let stall_after = self.inner.options.extraction.max_timeout() + self.inner.options.stall_grace;
        let stalled = !sched.in_flight.is_empty() && sched.last_progress.elapsed() > stall_after;
        if stalled {
            tracing::warn!(
                "Worker pool stalled: {} in flight, no progress for {:?}",
                sched.in_flight.len(),
                sched.last_progress.elapsed()
            );
        }
        !stalled
    }

    /// Start workers while slots are free and the queue is running
    pub(super) fn schedule(&self) {
        let ready: Vec<Uuid> = {
            let mut sched = self.inner.scheduler.lock();
            let mut ready = Vec::new();
            while !sched.paused && sched.in_flight.len() < sched.concurrency {
                let Some(id) = sched.pending.pop_front() else {
                    break;
                };
                sched.in_flight.insert(id);
                ready.push(id);
            }
            if !ready.is_empty() {
                sched.last_progress = Instant::now();
            }
            ready
        };

        for id in ready {
            tracing::debug!("Starting worker for task {}", id);
            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_worker(id).await;
            });
        }
    }

    /// Free the slot held by `id` and refill
    pub(super) fn finish_worker(&self, id: Uuid) {
        {
            let mut sched = self.inner.scheduler.lock();
            sched.in_flight.remove(&id);
            sched.last_progress = Instant::now();
        }
        self.schedule();
    }

    /// Free the slot held by `id` and put it back at the head of the pending
    /// list. Scheduling resumes after [`START_RETRY_DELAY`].
    pub(super) fn retry_worker(&self, id: Uuid) {
        {
            let mut sched = self.inner.scheduler.lock();
            sched.in_flight.remove(&id);
            sched.pending.push_front(id);
        }

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(START_RETRY_DELAY).await;
            engine.schedule();
        });
    }
}
