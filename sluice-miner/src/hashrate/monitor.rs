//! Board hashrate monitor.
//!
//! Drives periodic counter reads against the chain and folds the
//! register replies into a smoothed board total. Replies arrive through
//! [`CounterSink`], so the chain implementation stays free to deliver
//! them from its own read path.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::asic::{Asic, CounterSink};
use crate::tracing::prelude::*;
use crate::types::HashRate;

use super::{Median5, ERRATA_FACTOR};

/// Upper bound on a believable per-chip reading. Anything above this is
/// a glitched delta, not hashing.
const PER_CHIP_RATE_CEILING: f64 = 1.0e15;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the whole chain is sampled.
    pub sample_interval: Duration,
    /// Correction applied to every per-chip counter rate.
    pub errata_factor: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(5000),
            errata_factor: ERRATA_FACTOR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("hashrate monitor needs at least one chip")]
    NoChips,
}

struct ChipSlot {
    /// Counter value and timestamp of the previous reply.
    last: Option<(u32, Instant)>,
    /// Rate computed from this chip in the current cycle.
    cycle_rate: Option<f64>,
}

struct MonitorState {
    chips: Vec<ChipSlot>,
    median: Median5,
    raw_total: f64,
}

/// Accumulates per-chip counter replies into a board hashrate.
///
/// A cycle completes when every chip has contributed a fresh delta; the
/// summed total is then pushed through a five-sample median and
/// published on a watch channel.
pub struct HashrateMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    published: watch::Sender<HashRate>,
}

impl HashrateMonitor {
    pub fn new(chip_count: usize, config: MonitorConfig) -> Result<Self, MonitorError> {
        if chip_count == 0 {
            return Err(MonitorError::NoChips);
        }
        let chips = (0..chip_count)
            .map(|_| ChipSlot {
                last: None,
                cycle_rate: None,
            })
            .collect();
        let (published, _) = watch::channel(HashRate::ZERO);
        Ok(Self {
            config,
            state: Mutex::new(MonitorState {
                chips,
                median: Median5::new(),
                raw_total: 0.0,
            }),
            published,
        })
    }

    /// Instantaneous board total from the last complete cycle.
    pub fn hashrate(&self) -> HashRate {
        HashRate(self.state.lock().raw_total)
    }

    /// Median-smoothed board hashrate from the last complete cycle.
    pub fn smoothed_hashrate(&self) -> HashRate {
        *self.published.borrow()
    }

    pub fn chip_count(&self) -> usize {
        self.state.lock().chips.len()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashRate> {
        self.published.subscribe()
    }

    /// Records one register reply with an explicit timestamp.
    ///
    /// The first reply per chip only seeds the baseline. Later replies
    /// turn the wrapping counter delta into a rate; once every chip has
    /// a rate for the current cycle, the total is published and the
    /// cycle restarts.
    pub fn on_register_reply_at(&self, chip: usize, counter_now: u32, at: Instant) {
        let mut state = self.state.lock();
        let chip_count = state.chips.len();
        let Some(slot) = state.chips.get_mut(chip) else {
            warn!(chip, chip_count, "register reply for unknown chip index");
            return;
        };

        let previous = slot.last.replace((counter_now, at));
        let Some((counter_then, then)) = previous else {
            return;
        };

        let elapsed = at.duration_since(then).as_secs_f64();
        if elapsed <= 0.0 {
            trace!(chip, "discarding zero-elapsed counter sample");
            return;
        }

        // wrapping_sub makes a single counter rollover self-correcting.
        let delta = counter_now.wrapping_sub(counter_then);
        let rate = delta as f64 / elapsed * self.config.errata_factor;
        if !rate.is_finite() || rate > PER_CHIP_RATE_CEILING {
            warn!(chip, rate, "discarding implausible per-chip rate");
            return;
        }

        slot.cycle_rate = Some(rate);

        if state.chips.iter().all(|c| c.cycle_rate.is_some()) {
            let total: f64 = state.chips.iter().filter_map(|c| c.cycle_rate).sum();
            for c in state.chips.iter_mut() {
                c.cycle_rate = None;
            }
            state.median.push(total);
            state.raw_total = total;
            let smoothed = state.median.get().unwrap_or(total);
            drop(state);
            self.published.send_replace(HashRate(smoothed));
            debug!(raw = total, smoothed, "hashrate cycle complete");
        }
    }

    /// Spawns the sampling loop. The task runs until `cancel` fires.
    pub fn start(self: Arc<Self>, asic: Arc<dyn Asic>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(asic, cancel).await })
    }

    async fn run(&self, asic: Arc<dyn Asic>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = self.config.sample_interval.as_millis() as u64,
            chips = self.chip_count(),
            "hashrate monitor running"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("hashrate monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = asic.trigger_counter_read().await {
                        warn!(%err, "counter read failed");
                    }
                }
            }
        }
    }
}

impl CounterSink for HashrateMonitor {
    fn on_register_reply(&self, chip: usize, counter_now: u32) {
        self.on_register_reply_at(chip, counter_now, Instant::now());
    }
}
