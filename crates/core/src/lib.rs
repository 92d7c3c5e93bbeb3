pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod pool;
pub mod processor;
pub mod progress;
pub mod scheduler;
pub mod testing;
pub mod transcode;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, LoggingConfig, ServerConfig,
};
pub use error::MixError;
pub use load::{LoadMonitor, LoadMonitorConfig, LoadSource};
pub use merge::MergeCoordinator;
pub use pool::{ChunkResult, PoolStatus, WorkerPool};
pub use processor::{Mixer, MixJob, MixerStatus, ProcessorConfig};
pub use progress::{ProgressBroadcaster, ProgressEvent, ProgressSubscription, Stage};
pub use scheduler::{split, BatchPlan, Chunk};
pub use transcode::{
    FfmpegTranscoder, MixOptions, OutputFormat, TranscodeError, Transcoder, TranscoderConfig,
};
