//! Storage module for persistent task state
//!
//! Provides a JSON-file-backed task store with atomic whole-file writes.

mod task_store;

pub use task_store::{JsonTaskStore, TaskStore};
