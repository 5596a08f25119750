//! Device-side hashrate measurement.
//!
//! Chips expose a free-running 32-bit hash counter. The monitor samples
//! every chip on a fixed interval, converts counter deltas to per-chip
//! rates, and publishes a median-smoothed board total once every chip
//! has contributed to the current cycle.

mod median;
mod monitor;

pub use median::{Median, Median5};
pub use monitor::{HashrateMonitor, MonitorConfig, MonitorError};

/// Counter correction for cores that drop a fraction of ticks. Raw
/// counter rates read low by this factor.
pub const ERRATA_FACTOR: f64 = 1.046;
