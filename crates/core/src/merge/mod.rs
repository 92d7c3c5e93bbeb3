//! Final assembly of chunk outputs.
//!
//! The merge step treats the surviving chunk outputs, in chunk order, as the
//! inputs of an ordinary sequencing call with the job's full options. It is
//! the same call a single-pass job makes, so batched and single-pass jobs
//! render identically.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::MixError;
use crate::pool::ChunkResult;
use crate::progress::{ProgressBroadcaster, ProgressEvent, Stage};
use crate::transcode::{
    MixOptions, SequenceOutput, SequenceRequest, SequenceStage, TranscodeError, Transcoder,
};

/// Progress at which the merge starts.
pub const MERGE_START: f64 = 75.0;
/// Progress of a completed job.
pub const MERGE_END: f64 = 100.0;

/// Maps a stage fraction in [0, 1] into a progress window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub start: f64,
    pub end: f64,
}

impl ProgressWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Progress value for `fraction` of the way through the window.
    pub fn at(&self, fraction: f64) -> f64 {
        self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0)
    }
}

/// Successful chunk outputs in chunk order.
pub fn merge_inputs(results: &[ChunkResult]) -> Vec<PathBuf> {
    let mut ordered: Vec<&ChunkResult> = results.iter().filter(|r| r.is_success()).collect();
    ordered.sort_by_key(|r| r.index);
    ordered
        .into_iter()
        .filter_map(|r| r.output.clone())
        .collect()
}

/// Runs a sequencing call, forwarding its stage reports as progress events
/// mapped into `window`.
pub async fn sequence_with_events(
    transcoder: &dyn Transcoder,
    broadcaster: &ProgressBroadcaster,
    session_id: &str,
    request: SequenceRequest,
    window: ProgressWindow,
) -> Result<SequenceOutput, TranscodeError> {
    let (stage_tx, mut stage_rx) = mpsc::unbounded_channel();

    let forward = {
        let broadcaster = broadcaster.clone();
        let session_id = session_id.to_string();
        async move {
            while let Some(stage) = stage_rx.recv().await {
                broadcaster
                    .publish(ProgressEvent::new(
                        session_id.as_str(),
                        Stage::from(stage),
                        stage_message(stage),
                        window.at(stage.nominal_fraction()),
                    ))
                    .await;
            }
        }
    };

    let (result, ()) = tokio::join!(transcoder.sequence_with_progress(request, stage_tx), forward);
    result
}

fn stage_message(stage: SequenceStage) -> &'static str {
    match stage {
        SequenceStage::Sequencing => "Creating sequence",
        SequenceStage::Looping => "Creating loops",
        SequenceStage::Enhancing => "Applying audio enhancement",
        SequenceStage::Finalizing => "Finalizing output",
    }
}

/// Recombines chunk outputs into the final artifact.
pub struct MergeCoordinator {
    transcoder: Arc<dyn Transcoder>,
    broadcaster: ProgressBroadcaster,
}

impl MergeCoordinator {
    pub fn new(transcoder: Arc<dyn Transcoder>, broadcaster: ProgressBroadcaster) -> Self {
        Self {
            transcoder,
            broadcaster,
        }
    }

    /// Merges the successful chunk outputs into `output_path`.
    ///
    /// Chunks without an output, or whose output file is gone, are skipped.
    /// Fails with `NoValidChunks` if nothing survives and with `MergeFailed`
    /// if the sequencing call fails. Publishes `completed` at 100 on success.
    pub async fn merge(
        &self,
        session_id: &str,
        results: &[ChunkResult],
        options: &MixOptions,
        work_dir: &Path,
        output_path: &Path,
    ) -> Result<PathBuf, MixError> {
        let mut inputs = Vec::new();
        for path in merge_inputs(results) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                inputs.push(path);
            } else {
                debug!(session_id, path = %path.display(), "Chunk output missing, skipping");
            }
        }

        if inputs.is_empty() {
            return Err(MixError::NoValidChunks);
        }

        let count = inputs.len();
        self.broadcaster
            .publish(
                ProgressEvent::new(
                    session_id,
                    Stage::Merging,
                    format!("Merging {} chunks", count),
                    MERGE_START,
                )
                .with_total(count),
            )
            .await;

        tokio::fs::create_dir_all(work_dir).await?;
        let request = SequenceRequest {
            inputs,
            output_path: output_path.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            options: options.clone(),
        };

        let output = sequence_with_events(
            self.transcoder.as_ref(),
            &self.broadcaster,
            session_id,
            request,
            ProgressWindow::new(MERGE_START, MERGE_END),
        )
        .await
        .map_err(MixError::MergeFailed)?;

        info!(
            session_id,
            chunks = count,
            bytes = output.size_bytes,
            "Merge complete"
        );
        self.broadcaster
            .publish(ProgressEvent::new(
                session_id,
                Stage::Completed,
                "Processing complete",
                MERGE_END,
            ))
            .await;

        Ok(output.output_path)
    }
}
