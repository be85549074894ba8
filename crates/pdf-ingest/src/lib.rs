//! pdf-ingest: persistent PDF ingestion queue
//!
//! Uploaded PDFs become tasks in a JSON-backed store. A queue engine runs
//! text extraction on them with a configurable worker limit, survives
//! restarts by re-queueing interrupted work, and is exposed through a
//! service facade and an axum HTTP server.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use ingestion::{Extractor, PdfExtractor};
pub use processing::QueueEngine;
pub use service::IngestService;
pub use storage::{JsonTaskStore, TaskStore};
pub use types::{QueueStats, Task, TaskResult, TaskStatus};
