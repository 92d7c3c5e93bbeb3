//! Mix job execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::MixError;
use crate::load::{available_cores, LoadMonitor};
use crate::merge::{sequence_with_events, MergeCoordinator, ProgressWindow};
use crate::pool::{ChunkTask, WorkerPool};
use crate::progress::{ProgressBroadcaster, ProgressEvent, Stage};
use crate::scheduler::{split, BatchPlan};
use crate::transcode::{SequenceRequest, Transcoder};

use super::config::ProcessorConfig;
use super::types::{is_valid_session_id, MixJob, MixerStatus};

/// Progress of the batched path once chunks are planned.
const PREPARING_PROGRESS: f64 = 5.0;

/// Runs mix jobs.
///
/// Jobs with up to `batch_threshold` inputs are rendered by a single
/// sequencing call. Larger jobs are split into chunks, rendered by the
/// worker pool, and merged. Cloning is cheap; clones share the pool, the
/// load monitor and the broadcaster.
#[derive(Clone)]
pub struct Mixer {
    config: Arc<ProcessorConfig>,
    transcoder: Arc<dyn Transcoder>,
    broadcaster: ProgressBroadcaster,
    monitor: Arc<LoadMonitor>,
    pool: Arc<WorkerPool>,
    merger: Arc<MergeCoordinator>,
    cores: usize,
}

impl Mixer {
    /// Creates a mixer with a load monitor built from `config`.
    pub fn new(
        config: ProcessorConfig,
        transcoder: Arc<dyn Transcoder>,
        broadcaster: ProgressBroadcaster,
    ) -> Self {
        let monitor = Arc::new(LoadMonitor::new(config.load_monitor()));
        Self::with_monitor(config, transcoder, broadcaster, monitor)
    }

    /// Creates a mixer around an existing load monitor.
    pub fn with_monitor(
        config: ProcessorConfig,
        transcoder: Arc<dyn Transcoder>,
        broadcaster: ProgressBroadcaster,
        monitor: Arc<LoadMonitor>,
    ) -> Self {
        let pool = WorkerPool::new(
            Arc::clone(&monitor),
            broadcaster.clone(),
            config.temp_dir.clone(),
        );
        let merger = MergeCoordinator::new(Arc::clone(&transcoder), broadcaster.clone());

        Self {
            config: Arc::new(config),
            transcoder,
            broadcaster,
            monitor,
            pool: Arc::new(pool),
            merger: Arc::new(merger),
            cores: available_cores(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Returns the progress broadcaster jobs report to.
    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Returns the transcoder.
    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Returns the current mixer status.
    pub async fn status(&self) -> MixerStatus {
        MixerStatus {
            pool: self.pool.status(),
            load: self.monitor.current().await,
            active_units: self.monitor.active_units(),
            batch_threshold: self.config.batch_threshold,
        }
    }

    /// Chunking plan for a job.
    pub fn plan_for(&self, job: &MixJob) -> BatchPlan {
        job.plan
            .unwrap_or_else(|| BatchPlan::for_inputs(job.inputs.len(), self.cores))
    }

    /// Runs a job to completion.
    ///
    /// Once the session is claimed it ends in exactly one of `completed` or
    /// `failed`. An invalid or already claimed session id is rejected without
    /// publishing anything.
    pub async fn run(&self, job: MixJob) -> Result<PathBuf, MixError> {
        self.claim(&job).await?;
        self.process(job).await
    }

    /// Runs a job on a background task.
    ///
    /// The session is claimed and marked `queued` before this returns.
    pub async fn submit(
        &self,
        job: MixJob,
    ) -> Result<JoinHandle<Result<PathBuf, MixError>>, MixError> {
        self.claim(&job).await?;
        let mixer = self.clone();
        Ok(tokio::spawn(async move { mixer.process(job).await }))
    }

    async fn claim(&self, job: &MixJob) -> Result<(), MixError> {
        if !is_valid_session_id(&job.session_id) {
            return Err(MixError::invalid_job(format!(
                "invalid session id '{}'",
                job.session_id
            )));
        }

        let queued = ProgressEvent::new(
            job.session_id.as_str(),
            Stage::Queued,
            format!("Queued {} files", job.inputs.len()),
            0.0,
        )
        .with_total(job.inputs.len());
        if !self.broadcaster.try_open(queued).await {
            warn!(session_id = %job.session_id, "Session id already in use");
            return Err(MixError::SessionInUse {
                session_id: job.session_id.clone(),
            });
        }
        Ok(())
    }

    async fn process(&self, job: MixJob) -> Result<PathBuf, MixError> {
        let session_id = job.session_id.clone();
        let session_dir = self.config.temp_dir.join(&session_id);
        let result = self.execute(&job, &session_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&session_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %session_id, path = %session_dir.display(), error = %e, "Failed to remove session scratch directory");
            }
        }

        match &result {
            Ok(path) => info!(session_id = %session_id, output = %path.display(), "Mix job completed"),
            Err(e) => {
                error!(session_id = %session_id, kind = e.kind(), error = %e, "Mix job failed");
                let progress = self
                    .broadcaster
                    .get(&session_id)
                    .await
                    .map(|event| event.progress)
                    .unwrap_or(0.0);
                self.broadcaster
                    .publish(ProgressEvent::new(
                        session_id.as_str(),
                        Stage::Failed,
                        e.to_string(),
                        progress,
                    ))
                    .await;
            }
        }

        result
    }

    async fn execute(&self, job: &MixJob, session_dir: &Path) -> Result<PathBuf, MixError> {
        let session_id = job.session_id.as_str();
        let count = job.inputs.len();

        if count == 0 {
            return Err(MixError::invalid_job("no input files provided"));
        }
        job.options
            .validate()
            .map_err(|e| MixError::invalid_job(e.to_string()))?;

        self.broadcaster
            .publish(
                ProgressEvent::new(
                    session_id,
                    Stage::Validating,
                    format!("Validating {} files", count),
                    0.0,
                )
                .with_total(count),
            )
            .await;

        for (i, input) in job.inputs.iter().enumerate() {
            self.transcoder.validate_input(input).await.map_err(|e| {
                let name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                MixError::invalid_job(format!("input {} ({}): {}", i + 1, name, e))
            })?;
        }

        tokio::fs::create_dir_all(session_dir).await?;

        if count <= self.config.batch_threshold {
            info!(session_id, inputs = count, "Starting single-pass mix");
            self.single_pass(job, session_dir).await
        } else {
            self.batched(job, session_dir).await
        }
    }

    async fn single_pass(&self, job: &MixJob, session_dir: &Path) -> Result<PathBuf, MixError> {
        let request = SequenceRequest {
            inputs: job.inputs.clone(),
            output_path: job.output_path.clone(),
            work_dir: session_dir.join("sequence"),
            options: job.options.clone(),
        };

        let output = sequence_with_events(
            self.transcoder.as_ref(),
            &self.broadcaster,
            &job.session_id,
            request,
            ProgressWindow::new(0.0, 100.0),
        )
        .await?;

        self.broadcaster
            .publish(ProgressEvent::new(
                job.session_id.as_str(),
                Stage::Completed,
                "Processing complete",
                100.0,
            ))
            .await;
        Ok(output.output_path)
    }

    async fn batched(&self, job: &MixJob, session_dir: &Path) -> Result<PathBuf, MixError> {
        let session_id = job.session_id.as_str();
        let plan = self.plan_for(job);
        let chunks = split(&job.inputs, plan.chunk_size)?;
        let total = chunks.len();

        info!(
            session_id,
            inputs = job.inputs.len(),
            chunks = total,
            chunk_size = plan.chunk_size,
            max_concurrent = plan.max_concurrent,
            "Starting batched mix"
        );
        self.broadcaster
            .publish(
                ProgressEvent::new(
                    session_id,
                    Stage::Preparing,
                    format!(
                        "Processing {} files in {} chunks",
                        job.inputs.len(),
                        total
                    ),
                    PREPARING_PROGRESS,
                )
                .with_total(total),
            )
            .await;

        let chunk_dir = session_dir.join("chunks");
        tokio::fs::create_dir_all(&chunk_dir).await?;

        let transcoder = Arc::clone(&self.transcoder);
        let chunk_options = job.options.for_chunk();
        let mut report = self
            .pool
            .run(session_id, chunks, plan.max_concurrent, move |task: ChunkTask| {
                let transcoder = Arc::clone(&transcoder);
                let request = SequenceRequest {
                    output_path: chunk_dir.join(format!("chunk_{}.mp3", task.chunk.index)),
                    inputs: task.chunk.inputs,
                    work_dir: task.work_dir,
                    options: chunk_options.clone(),
                };
                async move { transcoder.sequence(request).await.map(|o| o.output_path) }
            })
            .await;

        if report.succeeded() == 0 {
            return Err(MixError::NoValidChunks);
        }
        if let Some((index, source)) = report.first_error.take() {
            return Err(MixError::ChunkProcessingFailed { index, source });
        }

        self.merger
            .merge(
                session_id,
                &report.results,
                &job.options,
                &session_dir.join("merge"),
                &job.output_path,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{ActiveUnitsLoad, LoadMonitorConfig};
    use crate::testing::MockTranscoder;
    use crate::transcode::MixOptions;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        transcoder: Arc<MockTranscoder>,
        broadcaster: ProgressBroadcaster,
        mixer: Mixer,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(MockTranscoder::new());
        let broadcaster = ProgressBroadcaster::new();
        let config = ProcessorConfig::default()
            .with_temp_dir(dir.path().join("tmp"))
            .with_output_dir(dir.path().join("output"))
            .with_batch_threshold(4);
        let monitor = Arc::new(LoadMonitor::with_source(
            LoadMonitorConfig::default(),
            ActiveUnitsLoad::new(64),
        ));
        let mixer = Mixer::with_monitor(config, transcoder.clone(), broadcaster.clone(), monitor);
        Fixture {
            dir,
            transcoder,
            broadcaster,
            mixer,
        }
    }

    fn inputs(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("track_{:02}.mp3", i))).collect()
    }

    fn output(f: &Fixture) -> PathBuf {
        f.dir.path().join("output").join("mix.mp3")
    }

    #[tokio::test]
    async fn test_empty_job_is_invalid() {
        let f = fixture();
        let job = MixJob::new(vec![], output(&f)).with_session_id("empty");

        let result = f.mixer.run(job).await;
        assert!(matches!(result, Err(MixError::InvalidJob { .. })));
        assert_eq!(f.transcoder.request_count().await, 0);

        let last = f.broadcaster.get("empty").await.unwrap();
        assert_eq!(last.stage, Stage::Failed);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_processing() {
        let f = fixture();
        f.transcoder.reject_input("track_01.mp3").await;
        let job = MixJob::new(inputs(3), output(&f)).with_session_id("bad");

        match f.mixer.run(job).await {
            Err(MixError::InvalidJob { reason }) => assert!(reason.contains("input 2 (track_01.mp3)")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(f.transcoder.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let f = fixture();
        for session_id in ["../escape", "bad id"] {
            let job = MixJob::new(inputs(1), output(&f)).with_session_id(session_id);
            assert!(matches!(f.mixer.run(job.clone()).await, Err(MixError::InvalidJob { .. })));
            assert!(matches!(f.mixer.submit(job).await, Err(MixError::InvalidJob { .. })));

            // Rejected before the session was opened, so it never lingers as queued.
            assert!(f.broadcaster.get(session_id).await.is_none());
        }
        assert_eq!(f.broadcaster.session_count().await, 0);
        assert_eq!(f.transcoder.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_id_claimed_once() {
        let f = fixture();
        f.transcoder.set_delay(Duration::from_millis(20)).await;
        let job = MixJob::new(inputs(2), output(&f)).with_session_id("shared");

        let (a, b) = tokio::join!(f.mixer.run(job.clone()), f.mixer.run(job.clone()));
        let (won, lost) = match (a, b) {
            (Ok(path), Err(e)) | (Err(e), Ok(path)) => (path, e),
            other => panic!("expected one winner, got {:?}", other),
        };
        assert!(won.exists());
        assert!(matches!(lost, MixError::SessionInUse { .. }));
        assert_eq!(f.transcoder.request_count().await, 1);
        assert_eq!(f.broadcaster.get("shared").await.unwrap().stage, Stage::Completed);

        // Still claimed until the session is cleaned up.
        assert!(matches!(f.mixer.submit(job.clone()).await, Err(MixError::SessionInUse { .. })));
        f.broadcaster.cleanup("shared").await;
        f.mixer.run(job).await.unwrap();
    }

    #[tokio::test]
    async fn test_single_pass_job() {
        let f = fixture();
        let job = MixJob::new(inputs(4), output(&f)).with_session_id("single");

        let path = f.mixer.run(job).await.unwrap();
        assert_eq!(path, output(&f));
        assert!(path.exists());

        let requests = f.transcoder.recorded_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].inputs, inputs(4));
        assert_eq!(requests[0].options, MixOptions::default());

        let last = f.broadcaster.get("single").await.unwrap();
        assert_eq!(last.stage, Stage::Completed);
        assert_eq!(last.progress, 100.0);
        assert!(!f.dir.path().join("tmp").join("single").exists());
    }

    #[tokio::test]
    async fn test_batched_job_chunks_and_merges() {
        let f = fixture();
        let job = MixJob::new(inputs(7), output(&f))
            .with_session_id("batch")
            .with_options(MixOptions {
                loops: 2,
                stereo: true,
                ..Default::default()
            })
            .with_plan(BatchPlan {
                chunk_size: 3,
                max_concurrent: 2,
            });

        let path = f.mixer.run(job.clone()).await.unwrap();

        let requests = f.transcoder.recorded_requests().await;
        assert_eq!(requests.len(), 4);

        let merge = requests.last().unwrap();
        assert_eq!(merge.options, job.options);
        assert_eq!(merge.inputs.len(), 3);
        for (i, input) in merge.inputs.iter().enumerate() {
            assert!(input.ends_with(format!("chunk_{}.mp3", i)));
        }
        for chunk in &requests[..3] {
            assert_eq!(chunk.options, job.options.for_chunk());
        }

        assert!(path.exists());
        assert!(!f.dir.path().join("tmp").join("batch").exists());
        assert_eq!(f.broadcaster.get("batch").await.unwrap().stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_chunk_error() {
        let f = fixture();
        f.transcoder.fail_on_input("track_04.mp3").await;
        let job = MixJob::new(inputs(6), output(&f))
            .with_session_id("partial")
            .with_plan(BatchPlan {
                chunk_size: 2,
                max_concurrent: 2,
            });

        match f.mixer.run(job).await {
            Err(MixError::ChunkProcessingFailed { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected result: {:?}", other),
        }
        // All three chunks ran, the merge did not.
        assert_eq!(f.transcoder.request_count().await, 3);
        assert!(!output(&f).exists());

        let last = f.broadcaster.get("partial").await.unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert!(last.message.contains("Chunk 2"));
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let f = fixture();
        let job = MixJob::new(inputs(2), output(&f)).with_session_id("bg");

        let handle = f.mixer.submit(job).await.unwrap();
        assert!(f.broadcaster.get("bg").await.is_some());

        let path = handle.await.unwrap().unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_status_reports_pool() {
        let f = fixture();
        let status = f.mixer.status().await;
        assert_eq!(status.batch_threshold, 4);
        assert_eq!(status.pool.active_chunks, 0);
    }
}
