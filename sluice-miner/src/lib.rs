//! Sluice miner core.
//!
//! Two cooperating halves around a device/client boundary: the
//! device-side hashrate measurement pipeline ([`hashrate`]) that turns
//! raw per-chip counters into a stable rate estimate, and the
//! client-side chart pipeline ([`chart`]) that turns polled telemetry
//! into trustworthy time series.

pub mod api_client;
pub mod asic;
pub mod board;
pub mod chart;
pub mod error;
pub mod hashrate;
pub mod tracing;
pub mod types;
