//! Configuration for the transcode module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration for the FFmpeg-based transcoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bitrate for mp3 artifacts and intermediates.
    #[serde(default = "default_mp3_bitrate")]
    pub mp3_bitrate: String,

    /// PCM codec for wav artifacts.
    #[serde(default = "default_wav_codec")]
    pub wav_codec: String,

    /// Output sample rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    /// Metadata tags written into every artifact.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_mp3_bitrate() -> String {
    "320k".to_string()
}

fn default_wav_codec() -> String {
    "pcm_s24le".to_string()
}

fn default_sample_rate() -> u32 {
    48000
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            log_level: default_log_level(),
            mp3_bitrate: default_mp3_bitrate(),
            wav_codec: default_wav_codec(),
            sample_rate_hz: default_sample_rate(),
            metadata: BTreeMap::new(),
        }
    }
}

impl TranscoderConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Adds a metadata tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
