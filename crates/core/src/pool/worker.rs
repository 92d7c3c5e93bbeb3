//! Bounded-concurrency chunk executor.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::load::LoadMonitor;
use crate::progress::{ProgressBroadcaster, ProgressEvent, Stage};
use crate::scheduler::Chunk;
use crate::transcode::TranscodeError;

use super::types::{ChunkResult, ChunkTask, PoolReport, PoolStatus};

/// Progress window covered by chunk processing.
const PROCESSING_START: f64 = 10.0;
const PROCESSING_SPAN: f64 = 60.0;

/// Tracks statistics for the worker pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    max_concurrent: AtomicUsize,
}

impl PoolStats {
    fn to_status(&self) -> PoolStatus {
        PoolStatus {
            active_chunks: self.active.load(Ordering::Relaxed) as usize,
            max_concurrent: self.max_concurrent.load(Ordering::Relaxed),
            queued_chunks: self.queued.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Processing progress shared by the tasks of one run.
struct RunProgress {
    session_id: String,
    total: usize,
    finished: usize,
    last: f64,
}

impl RunProgress {
    fn interpolate(&self, position: usize) -> f64 {
        PROCESSING_START + PROCESSING_SPAN * position as f64 / self.total as f64
    }
}

/// Runs chunk transforms with bounded concurrency.
///
/// Every chunk after the first waits for the load monitor to cool down and
/// then sleeps for its throttle delay before starting. A failed chunk never
/// cancels its siblings; all chunks run to completion before `run` returns.
pub struct WorkerPool {
    monitor: Arc<LoadMonitor>,
    broadcaster: ProgressBroadcaster,
    scratch_root: PathBuf,
    stats: Arc<PoolStats>,
}

/// Per-run state cloned into each chunk task.
struct RunContext<F> {
    monitor: Arc<LoadMonitor>,
    broadcaster: ProgressBroadcaster,
    stats: Arc<PoolStats>,
    semaphore: Arc<Semaphore>,
    progress: Arc<Mutex<RunProgress>>,
    transform: Arc<F>,
    session_dir: PathBuf,
}

impl<F> Clone for RunContext<F> {
    fn clone(&self) -> Self {
        Self {
            monitor: Arc::clone(&self.monitor),
            broadcaster: self.broadcaster.clone(),
            stats: Arc::clone(&self.stats),
            semaphore: Arc::clone(&self.semaphore),
            progress: Arc::clone(&self.progress),
            transform: Arc::clone(&self.transform),
            session_dir: self.session_dir.clone(),
        }
    }
}

impl WorkerPool {
    /// Creates a pool. Chunk scratch directories live under
    /// `<scratch_root>/<session>/`.
    pub fn new(
        monitor: Arc<LoadMonitor>,
        broadcaster: ProgressBroadcaster,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            monitor,
            broadcaster,
            scratch_root: scratch_root.into(),
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Returns the current pool status.
    pub fn status(&self) -> PoolStatus {
        self.stats.to_status()
    }

    /// Runs `transform` over every chunk, at most `max_concurrent` at a time.
    ///
    /// Returns one result per chunk, ordered by index, plus the first error
    /// by completion order.
    pub async fn run<F, Fut>(
        &self,
        session_id: &str,
        chunks: Vec<Chunk>,
        max_concurrent: usize,
        transform: F,
    ) -> PoolReport
    where
        F: Fn(ChunkTask) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PathBuf, TranscodeError>> + Send + 'static,
    {
        let total = chunks.len();
        let cap = max_concurrent.max(1);
        if total == 0 {
            return PoolReport {
                results: Vec::new(),
                first_error: None,
            };
        }

        info!(session_id, chunks = total, max_concurrent = cap, "Starting chunk processing");
        self.stats.max_concurrent.store(cap, Ordering::Relaxed);
        self.stats.queued.fetch_add(total as u64, Ordering::Relaxed);

        let ctx = RunContext {
            monitor: Arc::clone(&self.monitor),
            broadcaster: self.broadcaster.clone(),
            stats: Arc::clone(&self.stats),
            semaphore: Arc::new(Semaphore::new(cap)),
            progress: Arc::new(Mutex::new(RunProgress {
                session_id: session_id.to_string(),
                total,
                finished: 0,
                last: 0.0,
            })),
            transform: Arc::new(transform),
            session_dir: self.scratch_root.join(session_id),
        };

        let mut tasks = JoinSet::new();
        for chunk in chunks {
            let ctx = ctx.clone();
            let session_id = session_id.to_string();
            tasks.spawn(async move {
                let index = chunk.index;
                (index, run_chunk(ctx, session_id, chunk, total).await)
            });
        }

        let mut results: Vec<ChunkResult> = Vec::with_capacity(total);
        let mut first_error: Option<(usize, TranscodeError)> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(output))) => results.push(ChunkResult::success(index, output)),
                Ok((index, Err(e))) => {
                    warn!(session_id, chunk = index, error = %e, "Chunk failed");
                    results.push(ChunkResult::failure(index, e.to_string()));
                    if first_error.is_none() {
                        first_error = Some((index, e));
                    }
                }
                Err(e) => warn!(session_id, error = %e, "Chunk task did not complete"),
            }
        }

        // Tasks are never aborted, but keep one result per chunk regardless.
        if results.len() < total {
            let mut seen = vec![false; total];
            for result in &results {
                if let Some(slot) = seen.get_mut(result.index) {
                    *slot = true;
                }
            }
            for (index, _) in seen.iter().enumerate().filter(|(_, seen)| !**seen) {
                results.push(ChunkResult::failure(index, "chunk task did not complete"));
            }
        }

        results.sort_by_key(|r| r.index);

        let report = PoolReport {
            results,
            first_error,
        };
        info!(
            session_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Chunk processing finished"
        );
        report
    }
}

async fn run_chunk<F, Fut>(
    ctx: RunContext<F>,
    session_id: String,
    chunk: Chunk,
    total: usize,
) -> Result<PathBuf, TranscodeError>
where
    F: Fn(ChunkTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PathBuf, TranscodeError>> + Send + 'static,
{
    let index = chunk.index;

    let _permit = ctx
        .semaphore
        .acquire()
        .await
        .map_err(|_| TranscodeError::Io(std::io::Error::other("worker pool closed")))?;
    ctx.stats.queued.fetch_sub(1, Ordering::Relaxed);

    if index > 0 {
        ctx.monitor.cooldown_wait().await;
        let delay = ctx.monitor.throttle_delay().await;
        if !delay.is_zero() {
            debug!(session_id = %session_id, chunk = index, delay_ms = delay.as_millis() as u64, "Throttling chunk start");
            tokio::time::sleep(delay).await;
        }
    }

    ctx.stats.active.fetch_add(1, Ordering::Relaxed);
    report_start(&ctx, index).await;

    let work_dir = ctx.session_dir.join(format!("chunk_{}", index));
    let result = match tokio::fs::create_dir_all(&work_dir).await {
        Ok(()) => {
            let _unit = ctx.monitor.track();
            debug!(session_id = %session_id, chunk = index, inputs = chunk.len(), "Chunk started");
            let task = ChunkTask {
                session_id: session_id.clone(),
                chunk,
                work_dir: work_dir.clone(),
                total_chunks: total,
            };
            // Cleanup and counters below must run even if the transform panics.
            AssertUnwindSafe(async { (ctx.transform)(task).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!(session_id = %session_id, chunk = index, "Chunk transform panicked");
                    Err(TranscodeError::Io(std::io::Error::other(
                        "chunk transform panicked",
                    )))
                })
        }
        Err(e) => Err(TranscodeError::Io(e)),
    };

    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %work_dir.display(), error = %e, "Failed to remove chunk scratch directory");
        }
    }

    ctx.stats.active.fetch_sub(1, Ordering::Relaxed);
    match &result {
        Ok(_) => ctx.stats.total_processed.fetch_add(1, Ordering::Relaxed),
        Err(_) => ctx.stats.total_failed.fetch_add(1, Ordering::Relaxed),
    };
    report_finish(&ctx, index, result.is_ok()).await;

    result
}

async fn report_start<F>(ctx: &RunContext<F>, index: usize) {
    let mut progress = ctx.progress.lock().await;
    let value = progress.interpolate(index).max(progress.last);
    progress.last = value;

    let event = ProgressEvent::new(
        progress.session_id.as_str(),
        Stage::Processing,
        format!("Processing chunk {}/{}", index + 1, progress.total),
        value,
    )
    .with_item(format!("chunk {}", index + 1))
    .with_total(progress.total);
    ctx.broadcaster.publish(event).await;
}

async fn report_finish<F>(ctx: &RunContext<F>, index: usize, success: bool) {
    let mut progress = ctx.progress.lock().await;
    progress.finished += 1;
    let value = progress.interpolate(progress.finished).max(progress.last);
    progress.last = value;

    let message = if success {
        format!("Finished chunk {}/{}", index + 1, progress.total)
    } else {
        format!("Chunk {}/{} failed", index + 1, progress.total)
    };
    let event = ProgressEvent::new(progress.session_id.as_str(), Stage::Processing, message, value)
        .with_item(format!("chunk {}", index + 1))
        .with_total(progress.total);
    ctx.broadcaster.publish(event).await;
}
