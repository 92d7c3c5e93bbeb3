//! Types for the transcode module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::TranscodeError;

/// Output container of a mix artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MPEG Audio Layer III
    #[default]
    Mp3,
    /// WAVE (uncompressed PCM)
    Wav,
}

impl OutputFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    /// Returns the HTTP content type for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }

    /// Parses a user-supplied format name. Anything other than `wav` is mp3.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("wav") {
            Self::Wav
        } else {
            Self::Mp3
        }
    }
}

/// Processing options applied when sequencing a list of sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixOptions {
    /// Number of times the whole sequence is repeated (>= 1).
    #[serde(default = "default_loops")]
    pub loops: u32,
    /// Crossfade between consecutive sources and loop boundaries, in seconds.
    #[serde(default = "default_crossfade")]
    pub crossfade_secs: f64,
    /// Apply the enhancement filter chain.
    #[serde(default = "default_enhance")]
    pub enhance: bool,
    /// Apply stereo widening and force two channels.
    #[serde(default)]
    pub stereo: bool,
    /// Output container.
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_loops() -> u32 {
    1
}

fn default_crossfade() -> f64 {
    2.0
}

fn default_enhance() -> bool {
    true
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            loops: default_loops(),
            crossfade_secs: default_crossfade(),
            enhance: default_enhance(),
            stereo: false,
            format: OutputFormat::default(),
        }
    }
}

impl MixOptions {
    /// Options for an intermediate chunk render: same crossfade, a single
    /// pass, no enhancement or widening, mp3 container.
    pub fn for_chunk(&self) -> Self {
        Self {
            loops: 1,
            crossfade_secs: self.crossfade_secs,
            enhance: false,
            stereo: false,
            format: OutputFormat::Mp3,
        }
    }

    /// Checks the numeric ranges.
    pub fn validate(&self) -> Result<(), TranscodeError> {
        if self.loops == 0 {
            return Err(TranscodeError::invalid_request("loop count must be at least 1"));
        }
        if !self.crossfade_secs.is_finite() || self.crossfade_secs < 0.0 {
            return Err(TranscodeError::invalid_request(format!(
                "crossfade must be a non-negative number of seconds, got {}",
                self.crossfade_secs
            )));
        }
        Ok(())
    }
}

/// A request to turn an ordered list of sources into one artifact.
#[derive(Debug, Clone)]
pub struct SequenceRequest {
    /// Sources, in playback order.
    pub inputs: Vec<PathBuf>,
    /// Destination of the artifact.
    pub output_path: PathBuf,
    /// Scratch directory for intermediate files. Owned by the caller.
    pub work_dir: PathBuf,
    /// Processing options.
    pub options: MixOptions,
}

/// Result of a successful sequencing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceOutput {
    /// Path of the produced artifact.
    pub output_path: PathBuf,
    /// Size of the artifact in bytes.
    pub size_bytes: u64,
    /// Wall time of the call in milliseconds.
    pub duration_ms: u64,
}

/// Step reported by the engine while sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStage {
    /// Joining the sources.
    Sequencing,
    /// Repeating the sequence.
    Looping,
    /// Applying the enhancement chain.
    Enhancing,
    /// Encoding the final container.
    Finalizing,
}

impl SequenceStage {
    /// Position of this step within one sequencing call, in [0, 1].
    pub fn nominal_fraction(&self) -> f64 {
        match self {
            Self::Sequencing => 0.2,
            Self::Looping => 0.5,
            Self::Enhancing => 0.75,
            Self::Finalizing => 0.9,
        }
    }
}
