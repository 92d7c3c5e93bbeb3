//! Configuration for the processor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::load::LoadMonitorConfig;

/// Configuration for mix processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Scratch root for per-session, per-chunk and merge directories.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory multipart uploads are stored in, one subdirectory per session.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Directory final artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Jobs with more inputs than this go through chunked processing.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Load above which new chunks are held back.
    #[serde(default = "default_max_load")]
    pub max_load: f64,

    /// Minimum time between two load samples, in milliseconds.
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Poll period while waiting for load to drop, in milliseconds.
    #[serde(default = "default_cooldown_poll")]
    pub cooldown_poll_ms: u64,

    /// Maximum multipart request body size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("mixloop")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_batch_threshold() -> usize {
    20
}

fn default_max_load() -> f64 {
    0.7
}

fn default_sample_interval() -> u64 {
    500
}

fn default_cooldown_poll() -> u64 {
    100
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024 // 32 MiB
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            batch_threshold: default_batch_threshold(),
            max_load: default_max_load(),
            sample_interval_ms: default_sample_interval(),
            cooldown_poll_ms: default_cooldown_poll(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ProcessorConfig {
    /// Sets the scratch root.
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Sets the upload directory.
    pub fn with_upload_dir(mut self, dir: PathBuf) -> Self {
        self.upload_dir = dir;
        self
    }

    /// Sets the input count above which jobs are chunked.
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Sets the load ceiling.
    pub fn with_max_load(mut self, max_load: f64) -> Self {
        self.max_load = max_load;
        self
    }

    /// Load monitor settings derived from this config.
    pub fn load_monitor(&self) -> LoadMonitorConfig {
        LoadMonitorConfig {
            max_load: self.max_load,
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            cooldown_poll: Duration::from_millis(self.cooldown_poll_ms),
        }
    }
}
