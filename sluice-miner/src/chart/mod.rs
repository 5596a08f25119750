//! Chart-integrity core.
//!
//! Everything between raw device telemetry and a trustworthy plotted
//! series: per-sample guarding ([`guard`]), restart gating ([`warmup`]),
//! the canonical series store ([`series`]), axis bounds ([`axis`]),
//! versioned persistence ([`store`]), chunked backfill ([`drain`]) and
//! the service loop tying them together ([`service`]). The algorithmic
//! modules are free-standing and I/O-free; time always arrives as a
//! parameter.

pub mod axis;
pub mod config;
pub mod console;
pub mod drain;
pub mod guard;
pub mod pipeline;
pub mod series;
pub mod service;
pub mod store;
pub mod warmup;

use strum::{Display, EnumIter};

/// The six plotted channels, in series-array order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Channel {
    #[strum(serialize = "hr-1m")]
    Hashrate1m,
    #[strum(serialize = "hr-10m")]
    Hashrate10m,
    #[strum(serialize = "hr-1h")]
    Hashrate1h,
    #[strum(serialize = "hr-1d")]
    Hashrate1d,
    #[strum(serialize = "vreg-temp")]
    VregTemp,
    #[strum(serialize = "asic-temp")]
    AsicTemp,
}

impl Channel {
    pub const COUNT: usize = 6;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Hashrate1m,
        Channel::Hashrate10m,
        Channel::Hashrate1h,
        Channel::Hashrate1d,
        Channel::VregTemp,
        Channel::AsicTemp,
    ];

    /// Position in the series arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_hashrate(self) -> bool {
        matches!(
            self,
            Channel::Hashrate1m | Channel::Hashrate10m | Channel::Hashrate1h | Channel::Hashrate1d
        )
    }

    pub fn is_temperature(self) -> bool {
        !self.is_hashrate()
    }
}

/// One sample across all channels; NaN marks a gap.
pub type Row = [f64; Channel::COUNT];

/// Wall clock in epoch milliseconds.
pub fn unix_ms_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
