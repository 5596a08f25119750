//! Wire types for the device REST API.
//!
//! The device reports everything in raw integer units to keep its JSON
//! writer trivial; [`HistoryChunk::normalize`] is the single place
//! where raw units and relative timestamps become H/s, degrees Celsius
//! and absolute epoch milliseconds.

use serde::{Deserialize, Serialize};

/// Raw hashrate unit to H/s.
const RAW_HASHRATE_TO_HS: f64 = 1.0e9 / 100.0;
/// Raw temperature unit to degrees Celsius.
const RAW_TEMP_TO_C: f64 = 1.0 / 100.0;
/// Timestamp bases below this magnitude are seconds, not milliseconds.
const MS_EPOCH_THRESHOLD: i64 = 1_000_000_000_000;

/// Snapshot returned by `/api/v0/info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceInfo {
    pub uptime_secs: u64,
    pub system_ok: bool,
    /// Live (instantaneous) hashrate in H/s.
    pub hashrate_hs: f64,
    /// Nominal rate for the installed chain, in H/s.
    pub expected_hashrate_hs: f64,
    pub hashrate_1m_hs: f64,
    pub hashrate_10m_hs: f64,
    pub hashrate_1h_hs: f64,
    pub hashrate_1d_hs: f64,
    pub vreg_temp_c: f64,
    pub asic_temp_c: f64,
    /// Recent history window, anchored at the requested timestamp.
    pub history: Option<HistoryChunk>,
}

/// One windowed slice of device history, raw units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryChunk {
    /// Base the `timestamps` offsets are relative to. Seconds or
    /// milliseconds; sub-1e12 magnitude means seconds.
    #[serde(rename = "timestampBase")]
    pub timestamp_base: i64,
    pub timestamps: Vec<i64>,
    pub hashrate_1m: Vec<f64>,
    pub hashrate_10m: Vec<f64>,
    pub hashrate_1h: Vec<f64>,
    pub hashrate_1d: Vec<f64>,
    #[serde(rename = "vregTemp")]
    pub vreg_temp: Vec<f64>,
    #[serde(rename = "asicTemp")]
    pub asic_temp: Vec<f64>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// One history sample in chart units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub ts_ms: i64,
    pub hashrate_1m_hs: f64,
    pub hashrate_10m_hs: f64,
    pub hashrate_1h_hs: f64,
    pub hashrate_1d_hs: f64,
    pub vreg_temp_c: f64,
    pub asic_temp_c: f64,
}

impl HistoryChunk {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn ts_scale(&self) -> i64 {
        if self.timestamp_base != 0 && self.timestamp_base.abs() < MS_EPOCH_THRESHOLD {
            1000
        } else {
            1
        }
    }

    /// Newest absolute timestamp in the chunk, in milliseconds.
    pub fn newest_ts_ms(&self) -> Option<i64> {
        let scale = self.ts_scale();
        self.timestamps
            .iter()
            .map(|offset| (self.timestamp_base + offset) * scale)
            .max()
    }

    /// Converts the chunk into absolute-time, physical-unit samples.
    ///
    /// A seconds-based payload is scaled to milliseconds, offsets
    /// included. Mismatched array lengths are repaired by truncating to
    /// the shortest non-empty array; an empty value array pads its
    /// channel with NaN instead of shortening the chunk.
    pub fn normalize(&self) -> Vec<HistoryPoint> {
        let scale = self.ts_scale();

        let mut len = self.timestamps.len();
        for arr in [
            &self.hashrate_1m,
            &self.hashrate_10m,
            &self.hashrate_1h,
            &self.hashrate_1d,
            &self.vreg_temp,
            &self.asic_temp,
        ] {
            if !arr.is_empty() {
                len = len.min(arr.len());
            }
        }

        let hashrate_at = |arr: &Vec<f64>, i: usize| -> f64 {
            arr.get(i).map_or(f64::NAN, |v| v * RAW_HASHRATE_TO_HS)
        };
        let temp_at = |arr: &Vec<f64>, i: usize| -> f64 {
            arr.get(i).map_or(f64::NAN, |v| v * RAW_TEMP_TO_C)
        };

        (0..len)
            .map(|i| HistoryPoint {
                ts_ms: (self.timestamp_base + self.timestamps[i]) * scale,
                hashrate_1m_hs: hashrate_at(&self.hashrate_1m, i),
                hashrate_10m_hs: hashrate_at(&self.hashrate_10m, i),
                hashrate_1h_hs: hashrate_at(&self.hashrate_1h, i),
                hashrate_1d_hs: hashrate_at(&self.hashrate_1d, i),
                vreg_temp_c: temp_at(&self.vreg_temp, i),
                asic_temp_c: temp_at(&self.asic_temp, i),
            })
            .collect()
    }
}
