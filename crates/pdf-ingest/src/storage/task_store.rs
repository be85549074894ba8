//! JSON-file task store
//!
//! The whole store (tasks plus queue settings) is one JSON document. Every
//! mutation is applied to a copy of the in-memory index, written to a
//! temporary file next to the target and renamed over it; only then does
//! the copy replace the live index. A failed write leaves both disk and
//! memory at the previous state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{QueueSettings, Task, TaskPatch, TaskStatus};

/// Durable CRUD over task records
///
/// Implementations must make every mutating call durable before it returns.
pub trait TaskStore: Send + Sync {
    /// Append a task after every existing one.
    ///
    /// The stored display order is `max + 1` (or 0 for an empty store),
    /// whatever the incoming task carried. Returns the stored record.
    fn add_task(&self, task: Task) -> Result<Task>;

    /// Merge a patch into a task. `Ok(false)` when the id is unknown.
    fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<bool>;

    /// Get a task by id
    fn get_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// All tasks ordered by display order, then creation time
    fn get_all_tasks(&self) -> Result<Vec<Task>>;

    /// Tasks with the given status, in display order
    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Remove a task, returning the removed record if it existed
    fn remove_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// Remove every completed or failed task, returning the removed records
    fn clear_completed_tasks(&self) -> Result<Vec<Task>>;

    /// Order the next added task will get: max existing + 1, or 0
    fn next_display_order(&self) -> Result<i64>;

    /// Reassign display orders from a full list of the non-terminal tasks
    fn reorder_tasks(&self, ids: &[Uuid]) -> Result<()>;

    /// Saved queue settings, if any were ever saved
    fn settings(&self) -> Result<Option<QueueSettings>>;

    /// Persist queue settings
    fn save_settings(&self, settings: QueueSettings) -> Result<()>;

    /// Check that the backing storage is reachable
    fn health_check(&self) -> Result<()>;
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<QueueSettings>,
}

/// In-memory index keyed by task id
#[derive(Debug, Clone, Default)]
struct StoreState {
    tasks: HashMap<Uuid, Task>,
    settings: Option<QueueSettings>,
}

impl StoreState {
    fn sorted(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.sort_key());
        tasks
    }

    fn next_display_order(&self) -> i64 {
        self.tasks
            .values()
            .map(|t| t.display_order)
            .filter(|&order| order != Task::UNORDERED)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Give legacy records without an order a place after the ordered ones
    fn renumber_unordered(&mut self) -> usize {
        let mut unordered: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = self
            .tasks
            .values()
            .filter(|t| t.display_order == Task::UNORDERED)
            .map(|t| (t.created_at, t.id))
            .collect();
        unordered.sort();

        let mut next = self.next_display_order();
        for (_, id) in &unordered {
            if let Some(task) = self.tasks.get_mut(id) {
                task.display_order = next;
                next += 1;
            }
        }
        unordered.len()
    }
}

/// Task store backed by a single JSON file
pub struct JsonTaskStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonTaskStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// A missing file is an empty store; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::store(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut state = StoreState::default();
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::store(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if !content.trim().is_empty() {
                let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
                    Error::store(format!("Corrupt task database {}: {}", path.display(), e))
                })?;
                state.settings = file.settings;
                for task in file.tasks {
                    state.tasks.insert(task.id, task);
                }
            }
        }

        let store = Self {
            path,
            state: Mutex::new(StoreState::default()),
        };

        let renumbered = state.renumber_unordered();
        if renumbered > 0 {
            tracing::info!("Assigned display order to {} legacy tasks", renumbered);
            store.persist(&state)?;
        }

        tracing::info!(
            "Task store opened at {} ({} tasks)",
            store.path.display(),
            state.tasks.len()
        );
        *store.state.lock() = state;
        Ok(store)
    }

    /// Read-modify-write under the store lock
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    /// Write the full state via temp file + rename
    fn persist(&self, state: &StoreState) -> Result<()> {
        let file = StoreFile {
            tasks: state.sorted(),
            settings: state.settings,
        };
        let content = serde_json::to_vec_pretty(&file)?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            Error::store(format!("Failed to create temp file in {}: {}", dir.display(), e))
        })?;
        tmp.write_all(&content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::store(format!("Failed to write task database: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            Error::store(format!("Failed to replace {}: {}", self.path.display(), e.error))
        })?;

        Ok(())
    }
}

impl TaskStore for JsonTaskStore {
    fn add_task(&self, mut task: Task) -> Result<Task> {
        self.mutate(|state| {
            if state.tasks.contains_key(&task.id) {
                return Err(Error::invalid_argument(format!(
                    "DuplicateId: task {} already exists",
                    task.id
                )));
            }
            task.display_order = state.next_display_order();
            state.tasks.insert(task.id, task.clone());
            Ok(task)
        })
    }

    fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<bool> {
        if !self.state.lock().tasks.contains_key(&id) {
            return Ok(false);
        }
        self.mutate(|state| match state.tasks.get_mut(&id) {
            Some(task) => task.apply(patch).map(|_| true),
            None => Ok(false),
        })
    }

    fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.state.lock().tasks.get(&id).cloned())
    }

    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.state.lock().sorted())
    }

    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .state
            .lock()
            .sorted()
            .into_iter()
            .filter(|t| t.status == status)
            .collect())
    }

    fn remove_task(&self, id: Uuid) -> Result<Option<Task>> {
        if !self.state.lock().tasks.contains_key(&id) {
            return Ok(None);
        }
        self.mutate(|state| Ok(state.tasks.remove(&id)))
    }

    fn clear_completed_tasks(&self) -> Result<Vec<Task>> {
        let any_terminal = self
            .state
            .lock()
            .tasks
            .values()
            .any(|t| t.status.is_terminal());
        if !any_terminal {
            return Ok(Vec::new());
        }

        self.mutate(|state| {
            let ids: Vec<Uuid> = state
                .tasks
                .values()
                .filter(|t| t.status.is_terminal())
                .map(|t| t.id)
                .collect();
            let mut removed: Vec<Task> = ids
                .iter()
                .filter_map(|id| state.tasks.remove(id))
                .collect();
            removed.sort_by_key(|t| t.sort_key());
            Ok(removed)
        })
    }

    fn next_display_order(&self) -> Result<i64> {
        Ok(self.state.lock().next_display_order())
    }

    fn reorder_tasks(&self, ids: &[Uuid]) -> Result<()> {
        self.mutate(|state| {
            let mut seen = HashSet::with_capacity(ids.len());
            for id in ids {
                if !seen.insert(*id) {
                    return Err(Error::invalid_argument(format!(
                        "Task {} listed more than once",
                        id
                    )));
                }
                match state.tasks.get(id) {
                    None => {
                        return Err(Error::invalid_argument(format!("Unknown task {}", id)));
                    }
                    Some(task) if task.status.is_terminal() => {
                        return Err(Error::invalid_argument(format!(
                            "Task {} is already {}",
                            id, task.status
                        )));
                    }
                    Some(_) => {}
                }
            }

            let active = state
                .tasks
                .values()
                .filter(|t| !t.status.is_terminal())
                .count();
            if active != ids.len() {
                return Err(Error::invalid_argument(format!(
                    "Reorder must list all {} active tasks, got {}",
                    active,
                    ids.len()
                )));
            }

            for (index, id) in ids.iter().enumerate() {
                if let Some(task) = state.tasks.get_mut(id) {
                    task.apply(TaskPatch::display_order(index as i64))?;
                }
            }
            Ok(())
        })
    }

    fn settings(&self) -> Result<Option<QueueSettings>> {
        Ok(self.state.lock().settings)
    }

    fn save_settings(&self, settings: QueueSettings) -> Result<()> {
        self.mutate(|state| {
            state.settings = Some(settings);
            Ok(())
        })
    }

    fn health_check(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let meta = std::fs::metadata(dir)
            .map_err(|e| Error::store(format!("{} unreachable: {}", dir.display(), e)))?;
        if !meta.is_dir() {
            return Err(Error::store(format!("{} is not a directory", dir.display())));
        }
        Ok(())
    }
}
