//! Worker pool for chunk processing.
//!
//! The pool runs one task per chunk, bounded by a semaphore sized to the
//! job's concurrency cap. Load shedding happens at chunk-start boundaries:
//! every chunk after the first consults the `LoadMonitor` before it begins.
//! Each task owns a private scratch directory for its lifetime.

mod types;
mod worker;

pub use types::{ChunkResult, ChunkTask, PoolReport, PoolStatus};
pub use worker::WorkerPool;
