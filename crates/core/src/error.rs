//! Error taxonomy for mix jobs.

use thiserror::Error;

use crate::transcode::TranscodeError;

/// Terminal errors of a mix job.
///
/// A job ends in exactly one of `completed` or `failed`; the `failed` state
/// carries the first of these errors that was encountered.
#[derive(Debug, Error)]
pub enum MixError {
    /// The job was rejected before any scheduling happened.
    #[error("Invalid job: {reason}")]
    InvalidJob { reason: String },

    /// Another job already owns the session id. Nothing was published.
    #[error("Session {session_id} already exists")]
    SessionInUse { session_id: String },

    /// A chunk transform failed. Only the first failure by completion order
    /// is kept.
    #[error("Chunk {index} processing failed: {source}")]
    ChunkProcessingFailed {
        index: usize,
        #[source]
        source: TranscodeError,
    },

    /// No chunk produced a usable output, so there is nothing to merge.
    #[error("No valid chunks to merge")]
    NoValidChunks,

    /// The final assembly step failed.
    #[error("Failed to merge chunks: {0}")]
    MergeFailed(#[source] TranscodeError),

    /// A single-pass sequencing call failed.
    #[error("Sequencing failed: {0}")]
    Transcode(#[from] TranscodeError),

    /// Scratch directory handling failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MixError {
    /// Creates an invalid job error.
    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJob { .. } => "invalid_job",
            Self::SessionInUse { .. } => "session_in_use",
            Self::ChunkProcessingFailed { .. } => "chunk_processing_failed",
            Self::NoValidChunks => "no_valid_chunks",
            Self::MergeFailed(_) => "merge_failed",
            Self::Transcode(_) => "transcode_failed",
            Self::Io(_) => "io",
        }
    }
}
