//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mixloop server:
//! - HTTP request metrics (latency, counts)
//! - WebSocket progress stream metrics
//! - Mix jobs by outcome
//! - Worker pool and load status (collected dynamically)

use std::path::PathBuf;

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tracing::error;

use mixloop_core::MixError;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mixloop_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mixloop_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mixloop_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active progress streams.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mixloop_ws_connections_active",
        "Number of active progress WebSocket connections",
    )
    .unwrap()
});

/// Total progress streams (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mixloop_ws_connections_total",
        "Total progress WebSocket connections since startup",
    )
    .unwrap()
});

/// Progress events pushed to WebSocket clients, by stage.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mixloop_ws_messages_sent_total",
            "Progress events sent over WebSocket",
        ),
        &["stage"],
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Finished jobs by outcome (`completed` or the error kind).
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mixloop_jobs_total", "Finished mix jobs by outcome"),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Pool Metrics (collected dynamically)
// =============================================================================

/// Chunks currently being transformed.
pub static POOL_ACTIVE_CHUNKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mixloop_pool_active_chunks",
        "Number of chunks currently being transformed",
    )
    .unwrap()
});

/// Chunks waiting for a concurrency slot.
pub static POOL_QUEUED_CHUNKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mixloop_pool_queued_chunks",
        "Number of chunks waiting for a concurrency slot",
    )
    .unwrap()
});

/// Last smoothed load sample.
pub static LOAD_CURRENT: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("mixloop_load_current", "Last smoothed load sample in [0, 1]").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Jobs
    registry.register(Box::new(JOBS_TOTAL.clone())).unwrap();

    // Pool
    registry
        .register(Box::new(POOL_ACTIVE_CHUNKS.clone()))
        .unwrap();
    registry
        .register(Box::new(POOL_QUEUED_CHUNKS.clone()))
        .unwrap();
    registry.register(Box::new(LOAD_CURRENT.clone())).unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the pool and load gauges reflect the moment of
/// the scrape.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.mixer().status().await;
    POOL_ACTIVE_CHUNKS.set(status.pool.active_chunks as i64);
    POOL_QUEUED_CHUNKS.set(status.pool.queued_chunks as i64);
    LOAD_CURRENT.set(status.load);
}

/// Count a finished job under its outcome label.
pub fn record_job_outcome(result: &Result<PathBuf, MixError>) {
    let outcome = match result {
        Ok(_) => "completed",
        Err(e) => e.kind(),
    };
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Normalize a path for metric labels (replace session ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let mut previous = "";
    path.split('/')
        .map(|segment| {
            let normalized = if previous == "progress"
                || uuid::Uuid::parse_str(segment).is_ok()
                || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
            {
                "{id}"
            } else {
                segment
            };
            previous = segment;
            normalized
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_progress_session() {
        assert_eq!(
            normalize_path("/api/v1/progress/my-session"),
            "/api/v1/progress/{id}"
        );
        assert_eq!(normalize_path("/api/v1/progress"), "/api/v1/progress");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/jobs/42"), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_static() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn test_record_job_outcome() {
        let before = JOBS_TOTAL.with_label_values(&["no_valid_chunks"]).get();
        record_job_outcome(&Err(MixError::NoValidChunks));
        assert_eq!(
            JOBS_TOTAL.with_label_values(&["no_valid_chunks"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_encode_metrics_includes_registered_families() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/health", "200"])
            .inc();
        let text = encode_metrics();
        assert!(text.contains("mixloop_http_requests_total"));
    }
}
