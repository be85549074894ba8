//! Queue scheduling, workers and extraction timeouts

mod file_tier;
mod queue;
mod worker;

pub use file_tier::{extraction_timeout, FileTier, PdfAnalysis};
pub use queue::{EngineOptions, QueueEngine};
