//! Error types for the transcode module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the external transcoding engine.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Input file is not a supported format.
    #[error("Unsupported input format: {format}")]
    UnsupportedInput { format: String },

    /// Input file has no decodable audio stream.
    #[error("Invalid audio file {path}: {reason}")]
    InvalidAudio { path: PathBuf, reason: String },

    /// The request itself cannot be executed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// An ffmpeg invocation exited with a nonzero status.
    #[error("ffmpeg {step} failed (exit code {code:?}): {stderr}")]
    ProcessFailed {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    /// FFmpeg reported success but the artifact is missing.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// I/O error while preparing or running a step.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    /// Creates a process failure for the given step.
    pub fn failed(step: impl Into<String>, code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::ProcessFailed {
            step: step.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Whether the error concerns the input rather than the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound { .. } | Self::UnsupportedInput { .. } | Self::InvalidAudio { .. }
        )
    }
}
