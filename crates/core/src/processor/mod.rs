//! Processor module for mix jobs.
//!
//! This module provides the `Mixer`, the job submission boundary. It
//! validates a job's inputs and then either renders them with one
//! sequencing call or, above the batch threshold, coordinates:
//! - Scheduling: splitting inputs into ordered chunks
//! - Processing: rendering chunks on the bounded worker pool
//! - Merging: assembling chunk outputs into the final artifact
//!
//! Progress for every step is published to the `ProgressBroadcaster` under
//! the job's session id. A session id can be claimed by one job at a time;
//! it becomes free again once the broadcaster cleans the session up.
//!
//! # Example
//!
//! ```ignore
//! use mixloop_core::processor::{Mixer, MixJob, ProcessorConfig};
//! use mixloop_core::progress::ProgressBroadcaster;
//! use mixloop_core::transcode::FfmpegTranscoder;
//!
//! let broadcaster = ProgressBroadcaster::new();
//! let mixer = Mixer::new(
//!     ProcessorConfig::default(),
//!     Arc::new(FfmpegTranscoder::with_defaults()),
//!     broadcaster.clone(),
//! );
//!
//! let job = MixJob::new(inputs, "output/mix.mp3");
//! let mut progress = broadcaster.subscribe(&job.session_id).await;
//! let handle = mixer.submit(job).await?;
//!
//! while let Some(event) = progress.recv().await {
//!     println!("{}: {:.0}%", event.stage, event.progress);
//!     if event.stage.is_terminal() {
//!         break;
//!     }
//! }
//! let output = handle.await??;
//! ```

mod config;
mod mixer;
mod types;

pub use config::ProcessorConfig;
pub use mixer::Mixer;
pub use types::{is_valid_session_id, new_session_id, MixJob, MixerStatus};
