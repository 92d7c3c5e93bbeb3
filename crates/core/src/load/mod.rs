//! Load estimation and throttle decisions.
//!
//! The `LoadMonitor` keeps a smoothed load sample in [0, 1] and answers
//! three questions for the worker pool: should new work wait
//! (`should_throttle` / `cooldown_wait`), and how long to pause before
//! starting it (`throttle_delay`).
//!
//! The default source, `ActiveUnitsLoad`, estimates load from the number of
//! in-process work units rather than measuring CPU. Any `LoadSource` can be
//! plugged in instead.

mod monitor;
mod traits;

pub use monitor::{delay_for_load, ActiveUnitGuard, LoadMonitor, LoadMonitorConfig};
pub use traits::{available_cores, ActiveUnitsLoad, LoadSource};
