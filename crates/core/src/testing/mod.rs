//! Testing utilities and mock implementations.
//!
//! This module provides a mock of the external transcoding engine, allowing
//! full job lifecycles to run without ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use mixloop_core::testing::{fixtures, MockTranscoder};
//!
//! let transcoder = Arc::new(MockTranscoder::new());
//! transcoder.fail_on_input("track_004.mp3").await;
//!
//! let inputs = fixtures::input_paths(101);
//! // Use in a Mixer...
//! ```

mod mock_transcoder;

pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Ordered input paths `track_000.mp3`, `track_001.mp3`, ...
    pub fn input_paths(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| PathBuf::from(format!("track_{:03}.mp3", i)))
            .collect()
    }

    /// Writes `count` placeholder mp3 files into `dir` and returns their paths.
    pub fn write_inputs(dir: &Path, count: usize) -> std::io::Result<Vec<PathBuf>> {
        input_paths(count)
            .into_iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, b"ID3")?;
                Ok(path)
            })
            .collect()
    }
}
