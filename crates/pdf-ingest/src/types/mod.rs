//! Core types for the ingestion queue

pub mod stats;
pub mod task;

pub use stats::{QueueCounts, QueueStats, TaskCounts};
pub use task::{QueueSettings, Task, TaskPatch, TaskResult, TaskStatus};
