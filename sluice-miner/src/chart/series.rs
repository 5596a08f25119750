//! Canonical in-memory time series.
//!
//! One label array (epoch ms) plus one value array per channel, equal
//! length always. NaN is the gap marker; zero is never substituted for
//! a missing value.

use std::time::Duration;

use super::{Channel, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Same timestamp as the newest point, overwritten in place.
    Overwrote,
    /// At or before an older point, dropped.
    Skipped,
}

/// Outcome of a batch append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub appended: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub last_ts_ms: Option<i64>,
}

impl ImportReport {
    pub fn merge(&mut self, other: &ImportReport) {
        self.appended += other.appended;
        self.overwritten += other.overwritten;
        self.skipped += other.skipped;
        self.last_ts_ms = other.last_ts_ms.or(self.last_ts_ms);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Values padded with NaN to reach the label length.
    pub padded: usize,
    /// Values dropped beyond the label length.
    pub truncated: usize,
    /// Labels were missing entirely; everything was reset.
    pub reset: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChartState {
    labels: Vec<i64>,
    values: [Vec<f64>; Channel::COUNT],
}

impl ChartState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from loaded arrays. The caller is expected to
    /// run [`repair`](Self::repair) afterwards; loaded data has no
    /// length guarantees.
    pub fn from_parts(labels: Vec<i64>, values: [Vec<f64>; Channel::COUNT]) -> Self {
        Self { labels, values }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn last_ts_ms(&self) -> Option<i64> {
        self.labels.last().copied()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn channel(&self, channel: Channel) -> &[f64] {
        &self.values[channel.index()]
    }

    pub fn row_at(&self, index: usize) -> Option<(i64, Row)> {
        let ts = *self.labels.get(index)?;
        let mut row = [f64::NAN; Channel::COUNT];
        for (slot, series) in row.iter_mut().zip(&self.values) {
            *slot = series[index];
        }
        Some((ts, row))
    }

    /// Appends one sample. A timestamp equal to the newest point
    /// overwrites that point in place, so a chart never holds two
    /// points at identical x; anything older is dropped.
    pub fn append_point(&mut self, ts_ms: i64, row: &Row) -> AppendOutcome {
        self.debug_check();
        match self.labels.last().copied() {
            Some(last) if ts_ms < last => AppendOutcome::Skipped,
            Some(last) if ts_ms == last => {
                let index = self.labels.len() - 1;
                for (series, value) in self.values.iter_mut().zip(row) {
                    series[index] = *value;
                }
                AppendOutcome::Overwrote
            }
            _ => {
                self.labels.push(ts_ms);
                for (series, value) in self.values.iter_mut().zip(row) {
                    series.push(*value);
                }
                AppendOutcome::Appended
            }
        }
    }

    pub fn append_points(&mut self, points: impl IntoIterator<Item = (i64, Row)>) -> ImportReport {
        let mut report = ImportReport::default();
        for (ts_ms, row) in points {
            match self.append_point(ts_ms, &row) {
                AppendOutcome::Appended => report.appended += 1,
                AppendOutcome::Overwrote => report.overwritten += 1,
                AppendOutcome::Skipped => report.skipped += 1,
            }
        }
        report.last_ts_ms = self.last_ts_ms();
        report
    }

    /// Drops points older than the viewport. Front cut only, one
    /// linear scan and a single drain per series.
    pub fn trim_to_window(&mut self, window: Duration, now_ms: i64) -> usize {
        let cutoff = now_ms - window.as_millis() as i64;
        let cut = self
            .labels
            .iter()
            .position(|&ts| ts >= cutoff)
            .unwrap_or(self.labels.len());
        self.cut_front(cut);
        cut
    }

    /// Drops the oldest points beyond `cap`.
    pub fn enforce_cap(&mut self, cap: usize) -> usize {
        if self.labels.len() <= cap {
            return 0;
        }
        let cut = self.labels.len() - cap;
        self.cut_front(cut);
        cut
    }

    fn cut_front(&mut self, cut: usize) {
        if cut == 0 {
            return;
        }
        self.labels.drain(..cut);
        for series in &mut self.values {
            series.drain(..cut.min(series.len()));
        }
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        for series in &mut self.values {
            series.clear();
        }
    }

    /// Restores the equal-length invariant after a load or schema
    /// change: series are padded with NaN or truncated to the label
    /// length. Labels missing while series carry data is irrecoverable
    /// and resets the in-memory state (persisted storage is untouched).
    pub fn repair(&mut self) -> RepairReport {
        let mut report = RepairReport::default();
        let target = self.labels.len();

        if target == 0 {
            if self.values.iter().any(|s| !s.is_empty()) {
                self.clear();
                report.reset = true;
            }
            return report;
        }

        for series in &mut self.values {
            if series.len() < target {
                report.padded += target - series.len();
                series.resize(target, f64::NAN);
            } else if series.len() > target {
                report.truncated += series.len() - target;
                series.truncate(target);
            }
        }
        report
    }

    fn debug_check(&self) {
        debug_assert!(
            self.values.iter().all(|s| s.len() == self.labels.len()),
            "series length diverged from labels"
        );
    }
}
