use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mixloop_core::{
    load_config, load_config_from_env, validate_config, Config, FfmpegTranscoder, LoggingConfig,
    Mixer, ProgressBroadcaster, Transcoder,
};
use mixloop_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file, used when `MIXLOOP_CONFIG` is unset
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Logging depends on the configuration, so load failures go to stderr.
    let config = match load_configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run(config).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load and validate configuration from `MIXLOOP_CONFIG`, `config.toml`, or
/// the environment alone.
fn load_configuration() -> Result<Config> {
    let config = match std::env::var("MIXLOOP_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            load_config(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
        Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            load_config(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))?
        }
        Err(_) => load_config_from_env().context("Failed to load config from environment")?,
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting mixloop {}", VERSION);

    let processing = &config.processing;
    for dir in [
        &processing.temp_dir,
        &processing.upload_dir,
        &processing.output_dir,
    ] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    info!("Scratch directory: {:?}", processing.temp_dir);
    info!("Output directory: {:?}", processing.output_dir);
    info!(
        "Batch threshold: {} inputs, load ceiling: {}",
        processing.batch_threshold, processing.max_load
    );

    // The server still serves progress and status without ffmpeg
    let transcoder = FfmpegTranscoder::new(config.transcoder.clone());
    match transcoder.validate().await {
        Ok(()) => info!("Using transcoder: {}", transcoder.name()),
        Err(e) => warn!("Transcoder unavailable, mix jobs will fail: {}", e),
    }

    let broadcaster = ProgressBroadcaster::new();
    let mixer = Mixer::new(processing.clone(), Arc::new(transcoder), broadcaster);

    let state = Arc::new(AppState::new(config.clone(), mixer));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
