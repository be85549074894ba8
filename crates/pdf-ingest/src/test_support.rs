//! Shared helpers for unit tests

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::{Extraction, Extractor};
use crate::storage::{JsonTaskStore, TaskStore};
use crate::types::{QueueSettings, Task, TaskPatch, TaskStatus};

/// Build a small PDF with one text line per page and a Title entry
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Sample Report"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Write a placeholder upload and return its path
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4 placeholder").unwrap();
    path
}

/// Poll `check` until it holds or five seconds pass
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Scriptable extractor.
///
/// With a gate, every extraction blocks until the test releases a permit.
/// Files whose name is in `failing` fail; everything else yields three pages.
pub struct StubExtractor {
    gate: Option<Arc<Semaphore>>,
    failing: HashSet<String>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    started: Mutex<Vec<String>>,
}

impl StubExtractor {
    /// Completes immediately
    pub fn instant() -> Arc<Self> {
        Arc::new(Self::build(None, &[]))
    }

    /// Blocks until released
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(Some(Arc::new(Semaphore::new(0))), &[]))
    }

    /// Completes immediately, failing the named files
    pub fn failing(names: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(None, names))
    }

    fn build(gate: Option<Arc<Semaphore>>, failing: &[&str]) -> Self {
        Self {
            gate,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Let `n` blocked extractions finish
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Extractions currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous extractions seen
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// File names in the order extraction started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, path: &Path) -> Result<Extraction> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.started.lock().push(name.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&name) {
            return Err(Error::extraction(name, "stub failure"));
        }

        Ok(Extraction {
            text: format!("text of {}", name),
            page_count: 3,
            metadata: BTreeMap::new(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// JSON store that fails chosen writes and delegates everything else
pub struct FaultyStore {
    inner: JsonTaskStore,
    failing_updates: AtomicUsize,
    adds_allowed: AtomicUsize,
}

impl FaultyStore {
    pub fn open(path: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            inner: JsonTaskStore::open(path).unwrap(),
            failing_updates: AtomicUsize::new(0),
            adds_allowed: AtomicUsize::new(usize::MAX),
        })
    }

    /// Fail the next `n` calls to `update_task`
    pub fn fail_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    /// Let `n` more calls to `add_task` through, then fail the rest
    pub fn allow_adds(&self, n: usize) {
        self.adds_allowed.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TaskStore for FaultyStore {
    fn add_task(&self, task: Task) -> Result<Task> {
        if !Self::take(&self.adds_allowed) {
            return Err(Error::store("injected add failure"));
        }
        self.inner.add_task(task)
    }

    fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<bool> {
        if Self::take(&self.failing_updates) {
            return Err(Error::store("injected update failure"));
        }
        self.inner.update_task(id, patch)
    }

    fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.inner.get_task(id)
    }

    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.inner.get_all_tasks()
    }

    fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.inner.get_tasks_by_status(status)
    }

    fn remove_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.inner.remove_task(id)
    }

    fn clear_completed_tasks(&self) -> Result<Vec<Task>> {
        self.inner.clear_completed_tasks()
    }

    fn next_display_order(&self) -> Result<i64> {
        self.inner.next_display_order()
    }

    fn reorder_tasks(&self, ids: &[Uuid]) -> Result<()> {
        self.inner.reorder_tasks(ids)
    }

    fn settings(&self) -> Result<Option<QueueSettings>> {
        self.inner.settings()
    }

    fn save_settings(&self, settings: QueueSettings) -> Result<()> {
        self.inner.save_settings(settings)
    }

    fn health_check(&self) -> Result<()> {
        self.inner.health_check()
    }
}
