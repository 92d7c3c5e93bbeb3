//! Load monitor implementation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::{ActiveUnitsLoad, LoadSource};

/// Weight of the previous value when smoothing a new sample.
const PREVIOUS_WEIGHT: f64 = 0.7;
/// Weight of the new raw sample.
const SAMPLE_WEIGHT: f64 = 0.3;

/// Settings for a [`LoadMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadMonitorConfig {
    /// Load above which new work is held back.
    pub max_load: f64,
    /// Minimum time between two samples.
    pub sample_interval: Duration,
    /// Poll period of `cooldown_wait`.
    pub cooldown_poll: Duration,
}

impl Default for LoadMonitorConfig {
    fn default() -> Self {
        Self {
            max_load: 0.7,
            sample_interval: Duration::from_millis(500),
            cooldown_poll: Duration::from_millis(100),
        }
    }
}

/// Maps a load value to the delay applied before starting new work.
///
/// | load       | delay   |
/// |------------|---------|
/// | < 0.5      | 0       |
/// | [0.5, 0.7) | 200 ms  |
/// | [0.7, 0.8) | 500 ms  |
/// | >= 0.8     | 1000 ms |
pub fn delay_for_load(load: f64) -> Duration {
    if load >= 0.8 {
        Duration::from_millis(1000)
    } else if load >= 0.7 {
        Duration::from_millis(500)
    } else if load >= 0.5 {
        Duration::from_millis(200)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug)]
struct SampleState {
    current: f64,
    last_sample: Option<Instant>,
}

/// Estimates processing load and makes throttle decisions.
///
/// Workers register with [`LoadMonitor::track`] while they run; the monitor
/// turns the active count into a smoothed load sample, recomputed at most
/// once per sampling interval.
pub struct LoadMonitor {
    config: LoadMonitorConfig,
    source: Box<dyn LoadSource>,
    active: Arc<AtomicUsize>,
    state: Mutex<SampleState>,
}

impl LoadMonitor {
    /// Creates a monitor using the active-units heuristic for this machine.
    pub fn new(config: LoadMonitorConfig) -> Self {
        Self::with_source(config, ActiveUnitsLoad::detect())
    }

    /// Creates a monitor with a custom load source.
    pub fn with_source(config: LoadMonitorConfig, source: impl LoadSource + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
            active: Arc::new(AtomicUsize::new(0)),
            state: Mutex::new(SampleState {
                current: 0.0,
                last_sample: None,
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LoadMonitorConfig {
        &self.config
    }

    /// Marks one work unit as active until the guard is dropped.
    pub fn track(&self) -> ActiveUnitGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveUnitGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of work units currently active.
    pub fn active_units(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the smoothed load in [0, 1], resampling if the interval elapsed.
    pub async fn sample(&self) -> f64 {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(last) = state.last_sample {
            if now.duration_since(last) < self.config.sample_interval {
                return state.current;
            }
        }

        let raw = self
            .source
            .estimate(self.active_units())
            .clamp(0.0, 1.0);
        state.current = match state.last_sample {
            None => raw,
            Some(_) => PREVIOUS_WEIGHT * state.current + SAMPLE_WEIGHT * raw,
        };
        state.last_sample = Some(now);

        debug!(load = state.current, raw, "Sampled load");
        state.current
    }

    /// Last computed load, without triggering a new sample.
    pub async fn current(&self) -> f64 {
        self.state.lock().await.current
    }

    /// Whether load is above the configured ceiling.
    pub async fn should_throttle(&self) -> bool {
        self.sample().await > self.config.max_load
    }

    /// Waits until load drops to the configured ceiling or below.
    pub async fn cooldown_wait(&self) {
        let mut warned = false;
        while self.should_throttle().await {
            if !warned {
                let load = self.current().await;
                warn!(
                    load,
                    max_load = self.config.max_load,
                    "Load above ceiling, waiting for cooldown"
                );
                warned = true;
            }
            tokio::time::sleep(self.config.cooldown_poll).await;
        }
    }

    /// Delay to apply before starting new work at the current load.
    pub async fn throttle_delay(&self) -> Duration {
        delay_for_load(self.sample().await)
    }
}

/// Keeps a work unit counted as active. Decrements the count on drop.
#[derive(Debug)]
pub struct ActiveUnitGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveUnitGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
