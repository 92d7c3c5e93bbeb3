//! Transcode module for rendering audio sequences.
//!
//! This module provides the `Transcoder` trait, the boundary to the external
//! audio engine, and an FFmpeg-backed implementation.
//!
//! A sequencing call takes an ordered list of sources and produces one
//! artifact:
//!
//! 1. join the sources (re-encode, concat demuxer, or `acrossfade` chain)
//! 2. repeat the joined sequence `loops` times, crossfading the seams
//! 3. run the final encode with optional enhancement and stereo widening
//!
//! # Example
//!
//! ```ignore
//! use mixloop_core::transcode::{FfmpegTranscoder, MixOptions, SequenceRequest, Transcoder};
//!
//! let transcoder = FfmpegTranscoder::with_defaults();
//! transcoder.validate().await?;
//!
//! let output = transcoder
//!     .sequence(SequenceRequest {
//!         inputs: vec![PathBuf::from("a.mp3"), PathBuf::from("b.wav")],
//!         output_path: PathBuf::from("output/mix.mp3"),
//!         work_dir: PathBuf::from("/tmp/mixloop/session"),
//!         options: MixOptions::default(),
//!     })
//!     .await?;
//! println!("Wrote {} bytes", output.size_bytes);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::TranscoderConfig;
pub use error::TranscodeError;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::Transcoder;
pub use types::{MixOptions, OutputFormat, SequenceOutput, SequenceRequest, SequenceStage};
