//! Trait definitions for the load module.

/// Produces a raw load estimate in [0, 1].
///
/// The monitor smooths and rate-limits whatever this returns, so an
/// implementation only has to answer "how busy are we right now".
pub trait LoadSource: Send + Sync {
    /// Returns the raw load given the number of work units currently active.
    fn estimate(&self, active_units: usize) -> f64;
}

/// Heuristic load estimate derived from in-process concurrency.
///
/// This is a proxy, not a CPU measurement: it assumes each core can carry
/// ten active work units before the machine counts as saturated, so load is
/// `active / (cores * 10)` clamped to 1. A source backed by real OS
/// utilization can replace it without changing any caller.
#[derive(Debug, Clone, Copy)]
pub struct ActiveUnitsLoad {
    cores: usize,
}

/// Active units per core that count as full load.
const UNITS_PER_CORE: usize = 10;

impl ActiveUnitsLoad {
    /// Creates a source for the given core count (at least 1).
    pub fn new(cores: usize) -> Self {
        Self {
            cores: cores.max(1),
        }
    }

    /// Creates a source sized to the machine's available parallelism.
    pub fn detect() -> Self {
        Self::new(available_cores())
    }

    /// Returns the core count this source divides by.
    pub fn cores(&self) -> usize {
        self.cores
    }
}

impl LoadSource for ActiveUnitsLoad {
    fn estimate(&self, active_units: usize) -> f64 {
        let capacity = (self.cores * UNITS_PER_CORE) as f64;
        (active_units as f64 / capacity).min(1.0)
    }
}

/// Number of cores available to this process, falling back to 1.
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
