//! Capture file reading.
//!
//! A capture is JSON lines: one record per poll, carrying the
//! wall-clock receive time and the `/api/v0/info` payload as the
//! device sent it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use sluice_miner::api_client::DeviceInfo;

/// One captured poll.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    /// Wall-clock receive time, epoch milliseconds.
    pub ts_ms: i64,
    /// Device snapshot as polled.
    pub info: DeviceInfo,
}

/// Reads a JSON-lines capture. Blank lines are allowed; anything else
/// that fails to parse aborts with its line number.
pub fn read_records(path: &Path) -> Result<Vec<ReplayRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}:{}", path.display(), number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line)
            .with_context(|| format!("parsing {}:{}", path.display(), number + 1))?;
        records.push(record);
    }
    Ok(records)
}
