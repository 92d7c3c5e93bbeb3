//! Types for the pool module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scheduler::Chunk;
use crate::transcode::TranscodeError;

/// The unit of work handed to a chunk transform.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    /// Session the chunk belongs to.
    pub session_id: String,
    /// The chunk to process.
    pub chunk: Chunk,
    /// Private scratch directory, created before and removed after the
    /// transform runs. Outputs must be written elsewhere.
    pub work_dir: PathBuf,
    /// Number of chunks in the job.
    pub total_chunks: usize,
}

/// Outcome of one chunk. Produced exactly once per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub index: usize,
    /// Output artifact, absent on failure.
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

impl ChunkResult {
    /// A chunk that produced `output`.
    pub fn success(index: usize, output: PathBuf) -> Self {
        Self {
            index,
            output: Some(output),
            error: None,
        }
    }

    /// A chunk that failed.
    pub fn failure(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            output: None,
            error: Some(error.into()),
        }
    }

    /// Whether the chunk produced an output.
    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }
}

/// Everything a pool run produced.
#[derive(Debug)]
pub struct PoolReport {
    /// One result per chunk, ordered by chunk index.
    pub results: Vec<ChunkResult>,
    /// First failure by completion order, with its chunk index.
    pub first_error: Option<(usize, TranscodeError)>,
}

impl PoolReport {
    /// Number of chunks that produced an output.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of chunks that failed.
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Successful outputs in chunk order.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter_map(|r| r.output.clone())
            .collect()
    }
}

/// Status of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Chunks currently transforming.
    pub active_chunks: usize,
    /// Concurrency cap of the most recent run.
    pub max_concurrent: usize,
    /// Chunks waiting for a slot.
    pub queued_chunks: usize,
    /// Chunks completed since startup.
    pub total_processed: u64,
    /// Chunks failed since startup.
    pub total_failed: u64,
}
