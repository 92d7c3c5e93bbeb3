//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

use crate::transcode::{
    SequenceOutput, SequenceRequest, SequenceStage, TranscodeError, Transcoder,
};

/// Mock implementation of the Transcoder trait.
///
/// Provides controllable behavior for testing:
/// - Records every sequencing request
/// - Fails any request that touches a configured input
/// - Simulates latency and tracks peak concurrency
/// - Writes a real placeholder artifact listing the request's inputs
///
/// # Example
///
/// ```rust,ignore
/// use mixloop_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// transcoder.fail_on_input("/uploads/broken.mp3").await;
/// transcoder.set_delay(Duration::from_millis(20)).await;
///
/// // ... run a job ...
///
/// assert!(transcoder.peak_concurrency() <= 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    /// Recorded sequencing requests.
    requests: Arc<RwLock<Vec<SequenceRequest>>>,
    /// Inputs that make a sequencing call fail.
    failing_inputs: Arc<RwLock<HashSet<PathBuf>>>,
    /// Inputs rejected by `validate_input`.
    invalid_inputs: Arc<RwLock<HashSet<PathBuf>>>,
    /// Fail every sequencing call.
    fail_all: Arc<RwLock<bool>>,
    /// Simulated sequencing duration in milliseconds.
    delay_ms: Arc<RwLock<u64>>,
    /// Duration reported by `probe_duration`, in seconds.
    duration_secs: Arc<RwLock<f64>>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    /// Create a new mock transcoder.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            failing_inputs: Arc::new(RwLock::new(HashSet::new())),
            invalid_inputs: Arc::new(RwLock::new(HashSet::new())),
            fail_all: Arc::new(RwLock::new(false)),
            delay_ms: Arc::new(RwLock::new(0)),
            duration_secs: Arc::new(RwLock::new(180.0)),
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded requests.
    pub async fn recorded_requests(&self) -> Vec<SequenceRequest> {
        self.requests.read().await.clone()
    }

    /// Get the number of sequencing calls made.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Make any sequencing call that includes `path` fail.
    pub async fn fail_on_input(&self, path: impl AsRef<Path>) {
        self.failing_inputs
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Make `validate_input` reject `path`.
    pub async fn reject_input(&self, path: impl AsRef<Path>) {
        self.invalid_inputs
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Make every sequencing call fail.
    pub async fn set_fail_all(&self, fail: bool) {
        *self.fail_all.write().await = fail;
    }

    /// Set the simulated sequencing duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Set the duration reported by `probe_duration`.
    pub async fn set_duration(&self, secs: f64) {
        *self.duration_secs.write().await = secs;
    }

    /// Highest number of sequencing calls that ran at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn should_fail(&self, request: &SequenceRequest) -> Option<PathBuf> {
        if *self.fail_all.read().await {
            return request.inputs.first().cloned().or_else(|| Some(PathBuf::new()));
        }
        let failing = self.failing_inputs.read().await;
        request
            .inputs
            .iter()
            .find(|input| failing.contains(*input))
            .cloned()
    }

    async fn run(
        &self,
        request: SequenceRequest,
        stage_tx: Option<mpsc::UnboundedSender<SequenceStage>>,
    ) -> Result<SequenceOutput, TranscodeError> {
        let start = Instant::now();
        self.requests.write().await.push(request.clone());

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.render(&request, stage_tx, start).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn render(
        &self,
        request: &SequenceRequest,
        stage_tx: Option<mpsc::UnboundedSender<SequenceStage>>,
        start: Instant,
    ) -> Result<SequenceOutput, TranscodeError> {
        let report = |stage: SequenceStage| {
            if let Some(ref tx) = stage_tx {
                let _ = tx.send(stage);
            }
        };

        if request.inputs.is_empty() {
            return Err(TranscodeError::invalid_request("no input files provided"));
        }
        request.options.validate()?;

        report(SequenceStage::Sequencing);
        let delay = *self.delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(input) = self.should_fail(request).await {
            return Err(TranscodeError::failed(
                "sequence",
                Some(1),
                format!("{}: Invalid data found when processing input", input.display()),
            ));
        }

        if request.options.loops > 1 {
            report(SequenceStage::Looping);
        }
        if request.options.enhance {
            report(SequenceStage::Enhancing);
        }
        report(SequenceStage::Finalizing);

        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let listing: String = request
            .inputs
            .iter()
            .map(|input| format!("{}\n", input.display()))
            .collect();
        tokio::fs::write(&request.output_path, listing.as_bytes()).await?;

        Ok(SequenceOutput {
            output_path: request.output_path.clone(),
            size_bytes: listing.len() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        Ok(())
    }

    async fn validate_input(&self, path: &Path) -> Result<(), TranscodeError> {
        if self.invalid_inputs.read().await.contains(path) {
            return Err(TranscodeError::InvalidAudio {
                path: path.to_path_buf(),
                reason: "file does not contain an audio stream".to_string(),
            });
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.supported_input_formats().contains(&extension.as_str()) {
            return Err(TranscodeError::UnsupportedInput { format: extension });
        }
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64, TranscodeError> {
        Ok(*self.duration_secs.read().await)
    }

    async fn sequence(&self, request: SequenceRequest) -> Result<SequenceOutput, TranscodeError> {
        self.run(request, None).await
    }

    async fn sequence_with_progress(
        &self,
        request: SequenceRequest,
        stage_tx: mpsc::UnboundedSender<SequenceStage>,
    ) -> Result<SequenceOutput, TranscodeError> {
        self.run(request, Some(stage_tx)).await
    }
}
