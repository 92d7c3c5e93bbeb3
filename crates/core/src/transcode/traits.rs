//! Trait definitions for the transcode module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::TranscodeError;
use super::types::{SequenceOutput, SequenceRequest, SequenceStage};

/// The external engine that renders audio sequences.
///
/// Implementations are treated as black boxes: a request either produces an
/// artifact at `request.output_path` or fails with an opaque reason.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), TranscodeError>;

    /// Checks that a single source is a supported, decodable audio file.
    async fn validate_input(&self, path: &Path) -> Result<(), TranscodeError>;

    /// Returns the duration of an audio file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError>;

    /// Sequences the sources into one artifact.
    async fn sequence(&self, request: SequenceRequest) -> Result<SequenceOutput, TranscodeError>;

    /// Sequences the sources, reporting each step on `stage_tx`.
    ///
    /// If the receiver is dropped, sequencing continues without reports.
    async fn sequence_with_progress(
        &self,
        request: SequenceRequest,
        stage_tx: mpsc::UnboundedSender<SequenceStage>,
    ) -> Result<SequenceOutput, TranscodeError>;

    /// Returns the supported input extensions.
    fn supported_input_formats(&self) -> &[&str] {
        &["mp3", "wav"]
    }
}
