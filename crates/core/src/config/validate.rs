use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Load ceiling is in (0, 1]
/// - Batch threshold and load sampling periods are non-zero
/// - Transcoder binary paths are set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let processing = &config.processing;
    if !(processing.max_load > 0.0 && processing.max_load <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "processing.max_load must be in (0, 1], got {}",
            processing.max_load
        )));
    }
    if processing.batch_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "processing.batch_threshold cannot be 0".to_string(),
        ));
    }
    if processing.sample_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "processing.sample_interval_ms cannot be 0".to_string(),
        ));
    }
    if processing.cooldown_poll_ms == 0 {
        return Err(ConfigError::ValidationError(
            "processing.cooldown_poll_ms cannot be 0".to_string(),
        ));
    }

    if config.transcoder.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "transcoder.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.transcoder.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "transcoder.ffprobe_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
