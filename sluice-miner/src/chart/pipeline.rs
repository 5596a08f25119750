//! Telemetry-to-chart pipeline.
//!
//! Binds the guard, the warmup machine and the series store into one
//! ingest path. Live polls and history backfill run through the same
//! guarding, so a backfilled sample cannot bypass the defenses.

use std::time::Instant;

use super::axis::{AxisBounds, AxisGroup, AxisScale};
use super::config::{ChartConfig, ValueDomain};
use super::guard::{GraphGuard, GuardDecision};
use super::series::{AppendOutcome, ChartState, ImportReport};
use super::warmup::{LiveProbe, WarmupMachine, WarmupStage};
use super::{Channel, Row};
use crate::api_client::types::{DeviceInfo, HistoryChunk, HistoryPoint};
use crate::tracing::prelude::*;

/// What one live poll did to the chart.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    pub stage: WarmupStage,
    /// A restart gap row was inserted on this poll.
    pub break_inserted: bool,
    /// A data row landed (appended or overwrote).
    pub appended: bool,
    pub ts_ms: Option<i64>,
    /// Guard decision per channel; `None` for gated-off channels.
    pub verdicts: [Option<GuardDecision>; Channel::COUNT],
}

pub struct ChartPipeline {
    config: ChartConfig,
    guard: GraphGuard,
    warmup: WarmupMachine,
    state: ChartState,
    hashrate_axis: AxisScale,
    temperature_axis: AxisScale,
}

impl ChartPipeline {
    pub fn new(config: ChartConfig) -> Self {
        Self::with_state(config, ChartState::new())
    }

    /// Starts from a previously persisted series. Guard and warmup
    /// state always start fresh; only the plotted data survives a
    /// process restart.
    pub fn with_state(config: ChartConfig, state: ChartState) -> Self {
        let guard = GraphGuard::new(config.guard.clone());
        let warmup = WarmupMachine::new(config.warmup.clone());
        Self {
            config,
            guard,
            warmup,
            state,
            hashrate_axis: AxisScale::hashrate(),
            temperature_axis: AxisScale::temperature(),
        }
    }

    pub fn state(&self) -> &ChartState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn last_ts_ms(&self) -> Option<i64> {
        self.state.last_ts_ms()
    }

    pub fn stage(&self) -> WarmupStage {
        self.warmup.stage()
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Feeds one poll into warmup and the live reference without
    /// plotting a row. Used when the plotted points come from history
    /// chunks instead of the wall clock, and while a drain owns the
    /// tail of the chart.
    pub fn observe_info_at(&mut self, now: Instant, wall_ms: i64, info: &DeviceInfo) -> IngestOutcome {
        let live = info.hashrate_hs;
        let probe = self.derive_probe(info);
        self.warmup.observe_live_at(now, &probe);

        if live.is_finite() && live > 0.0 {
            self.guard.observe_live_ref(live);
        }

        let mut outcome = IngestOutcome {
            stage: self.warmup.stage(),
            break_inserted: false,
            appended: false,
            ts_ms: None,
            verdicts: [None; Channel::COUNT],
        };

        if self.warmup.consume_break_pending() {
            // One explicit gap terminates the pre-restart curves, and
            // nothing learned before the restart may leak past it.
            self.guard.reset();
            let ts = match self.state.last_ts_ms() {
                Some(last) if wall_ms <= last => last + 1,
                _ => wall_ms,
            };
            self.state.append_point(ts, &[f64::NAN; Channel::COUNT]);
            outcome.break_inserted = true;
            debug!(ts_ms = ts, "restart break inserted");
        }

        outcome
    }

    /// Feeds one live poll through warmup and the guard and plots a
    /// wall-clock row.
    pub fn ingest_info_at(&mut self, now: Instant, wall_ms: i64, info: &DeviceInfo) -> IngestOutcome {
        let live = info.hashrate_hs;
        let mut outcome = self.observe_info_at(now, wall_ms, info);

        // Nothing is plotted while locked, and nothing while boot-like
        // polls are still accumulating toward the lock: if the streak
        // confirms, the break must land directly after the last healthy
        // point.
        if self.warmup.is_locked() || self.warmup.boot_suspected() {
            self.trim(wall_ms);
            return outcome;
        }

        let enabled = self.warmup.enabled();
        let live_ref = (live.is_finite() && live > 0.0).then_some(live);
        let raws: Row = [
            info.hashrate_1m_hs,
            info.hashrate_10m_hs,
            info.hashrate_1h_hs,
            info.hashrate_1d_hs,
            info.vreg_temp_c,
            info.asic_temp_c,
        ];

        let mut row = [f64::NAN; Channel::COUNT];
        for ch in Channel::ALL {
            if !enabled.allows(ch) {
                continue;
            }
            let policy = self.config.policy(ch);
            let reference = if ch.is_hashrate() { live_ref } else { None };
            let verdict = self.guard.evaluate(ch, raws[ch.index()], &policy, reference, None);
            row[ch.index()] = verdict.value;
            outcome.verdicts[ch.index()] = Some(verdict.decision);
        }

        if enabled.allows(Channel::Hashrate1m) && row[Channel::Hashrate1m.index()].is_finite() {
            self.warmup.notify_hr1m_flow();
            outcome.stage = self.warmup.stage();
        }

        let applied = self.state.append_point(wall_ms, &row);
        outcome.appended = matches!(applied, AppendOutcome::Appended | AppendOutcome::Overwrote);
        outcome.ts_ms = Some(wall_ms);
        self.trim(wall_ms);
        outcome
    }

    /// Merges one history chunk; see [`ingest_history_points`](Self::ingest_history_points).
    pub fn ingest_history(&mut self, chunk: &HistoryChunk) -> ImportReport {
        let points = chunk.normalize();
        self.ingest_history_points(&points)
    }

    /// Runs backfilled samples through the same guard path as live
    /// polls, using the latest live reference for the gated channels.
    /// While the chart is locked the whole batch is dropped.
    pub fn ingest_history_points(&mut self, points: &[HistoryPoint]) -> ImportReport {
        let mut report = ImportReport::default();
        if self.warmup.is_locked() {
            report.skipped = points.len();
            report.last_ts_ms = self.state.last_ts_ms();
            return report;
        }

        let live_ref = self.guard.latest_live_ref();
        for point in points {
            // Stale samples are dropped before they can disturb the
            // guard state.
            if let Some(last) = self.state.last_ts_ms() {
                if point.ts_ms < last {
                    report.skipped += 1;
                    continue;
                }
            }

            let raws: Row = [
                point.hashrate_1m_hs,
                point.hashrate_10m_hs,
                point.hashrate_1h_hs,
                point.hashrate_1d_hs,
                point.vreg_temp_c,
                point.asic_temp_c,
            ];
            // Re-read the mask per point: a finite 1m sample inside
            // this batch can unlock the remaining channels for the
            // points that follow it.
            let enabled = self.warmup.enabled();
            let mut row = [f64::NAN; Channel::COUNT];
            for ch in Channel::ALL {
                if !enabled.allows(ch) {
                    continue;
                }
                let policy = self.config.policy(ch);
                let reference = if ch.is_hashrate() { live_ref } else { None };
                row[ch.index()] = self.guard.apply(ch, raws[ch.index()], &policy, reference, None);
            }

            if enabled.allows(Channel::Hashrate1m) && row[Channel::Hashrate1m.index()].is_finite() {
                self.warmup.notify_hr1m_flow();
            }

            match self.state.append_point(point.ts_ms, &row) {
                AppendOutcome::Appended => report.appended += 1,
                AppendOutcome::Overwrote => report.overwritten += 1,
                AppendOutcome::Skipped => report.skipped += 1,
            }
        }

        report.last_ts_ms = self.state.last_ts_ms();
        if let Some(front) = self.state.last_ts_ms() {
            self.trim(front);
        }
        report
    }

    /// Wipes the plotted series and everything the guard learned from
    /// it. Warmup is left alone; a wipe is not a restart.
    pub fn clear_history(&mut self) {
        self.state.clear();
        self.guard.reset();
        info!("chart history cleared");
    }

    pub fn axis_bounds(&self, group: AxisGroup) -> Option<AxisBounds> {
        let scale = match group {
            AxisGroup::Hashrate => &self.hashrate_axis,
            AxisGroup::Temperature => &self.temperature_axis,
        };
        scale.bounds(group.channels().iter().map(|ch| self.state.channel(*ch)))
    }

    pub fn set_axis_padding(&mut self, group: AxisGroup, padding: f64) {
        let scale = match group {
            AxisGroup::Hashrate => &mut self.hashrate_axis,
            AxisGroup::Temperature => &mut self.temperature_axis,
        };
        scale.set_padding(padding);
    }

    fn derive_probe(&self, info: &DeviceInfo) -> LiveProbe {
        let live = info.hashrate_hs;
        let hashing = live.is_finite() && live > 0.0;
        let expected = info.expected_hashrate_hs;
        // A misconfigured expected rate must not lock the chart
        // forever; without one, any hashing counts as unlocked.
        let unlocked = if expected.is_finite() && expected > 0.0 {
            hashing && live >= expected * self.config.warmup.unlock_ratio
        } else {
            hashing
        };
        LiveProbe {
            system_ok: info.system_ok,
            unlocked,
            hashing,
            vreg_temp_ok: ValueDomain::TEMPERATURE.contains(info.vreg_temp_c),
            asic_temp_ok: ValueDomain::TEMPERATURE.contains(info.asic_temp_c),
        }
    }

    fn trim(&mut self, now_ms: i64) {
        self.state.trim_to_window(self.config.viewport, now_ms);
        self.state.enforce_cap(self.config.load_cap);
    }
}
