//! Types for the processor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pool::PoolStatus;
use crate::scheduler::BatchPlan;
use crate::transcode::MixOptions;

/// A mix request: ordered inputs, options and the artifact destination.
///
/// Immutable once handed to the mixer.
#[derive(Debug, Clone)]
pub struct MixJob {
    /// Session correlating this job with its progress stream.
    pub session_id: String,
    /// Sources, in playback order.
    pub inputs: Vec<PathBuf>,
    /// Processing options.
    pub options: MixOptions,
    /// Destination of the final artifact.
    pub output_path: PathBuf,
    /// Chunking override. Picked from the input count when `None`.
    pub plan: Option<BatchPlan>,
}

impl MixJob {
    /// Creates a job with a generated session id and default options.
    pub fn new(inputs: Vec<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: new_session_id(),
            inputs,
            options: MixOptions::default(),
            output_path: output_path.into(),
            plan: None,
        }
    }

    /// Sets the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the processing options.
    pub fn with_options(mut self, options: MixOptions) -> Self {
        self.options = options;
        self
    }

    /// Forces a chunk size and concurrency cap.
    pub fn with_plan(mut self, plan: BatchPlan) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// Generates a fresh session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Whether `session_id` is safe to use as a directory name.
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Overall mixer status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerStatus {
    /// Worker pool counters.
    pub pool: PoolStatus,
    /// Last load sample in [0, 1].
    pub load: f64,
    /// Work units currently counted by the load monitor.
    pub active_units: usize,
    /// Input count above which jobs are chunked.
    pub batch_threshold: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_builder() {
        let job = MixJob::new(vec![PathBuf::from("a.mp3")], "out/mix.mp3")
            .with_session_id("abc")
            .with_plan(BatchPlan {
                chunk_size: 2,
                max_concurrent: 1,
            });
        assert_eq!(job.session_id, "abc");
        assert_eq!(job.output_path, PathBuf::from("out/mix.mp3"));
        assert_eq!(job.plan.unwrap().chunk_size, 2);
    }

    #[test]
    fn test_generated_session_ids() {
        let a = MixJob::new(vec![], "a.mp3");
        let b = MixJob::new(vec![], "b.mp3");
        assert_ne!(a.session_id, b.session_id);
        assert!(is_valid_session_id(&a.session_id));
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("session_1-a"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id(&"x".repeat(129)));
    }
}
