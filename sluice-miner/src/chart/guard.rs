//! Per-channel sample acceptance.
//!
//! History streamed from the device shows transient false dips for a
//! few samples after restarts even when the live rate is fine; plotting
//! them raw produces alarming teeth. The guard runs two defenses per
//! sample, a live-reference gate and same-direction step confirmation,
//! and guarantees the output is always finite or NaN. It never fails a
//! caller: out-of-policy input degrades to holding the previous value
//! or a NaN gap.

use std::collections::{HashMap, VecDeque};

use super::config::{GuardConfig, GuardPolicy};
use super::Channel;

/// What happened to one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum GuardDecision {
    /// First sample for the channel, taken as the baseline.
    #[strum(serialize = "seeded")]
    Seeded,
    /// In policy, or a confirmed step.
    #[strum(serialize = "accepted")]
    Accepted,
    /// Large step corroborated by the live reference, accepted at once.
    #[strum(serialize = "big-step")]
    AcceptedBigStep,
    /// Suspicious step, previous value repeated while confirming.
    #[strum(serialize = "held")]
    HeldSuspect,
    /// Disagrees with the live reference, previous value repeated.
    #[strum(serialize = "live-gate")]
    RejectedLiveGate,
    /// Invalid sample replaced from the accepted window.
    #[strum(serialize = "substituted")]
    SubstitutedInvalid,
    /// Invalid sample with nothing to substitute.
    #[strum(serialize = "gap")]
    Gap,
}

#[derive(Debug, Clone, Copy)]
pub struct GuardVerdict {
    pub value: f64,
    pub decision: GuardDecision,
}

#[derive(Debug, Default)]
struct ChannelState {
    last_accepted: Option<f64>,
    /// +1 rising, -1 falling, 0 no suspect run.
    run_direction: i8,
    run_length: u32,
    /// Recently plotted values, fallback source for invalid samples.
    window: VecDeque<f64>,
}

/// Relative difference against the larger magnitude. Equal inputs give
/// zero even at zero, so a flat-zero stream never divides by itself.
fn rel_diff(a: f64, b: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    let denom = a.abs().max(b.abs());
    if denom == 0.0 {
        return 0.0;
    }
    (a - b).abs() / denom
}

fn finite_positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

pub struct GraphGuard {
    config: GuardConfig,
    channels: HashMap<Channel, ChannelState>,
    live_ring: VecDeque<f64>,
}

impl GraphGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
            live_ring: VecDeque::new(),
        }
    }

    /// Clears every per-channel state and the live reference ring.
    /// Called on explicit history wipes and detected restarts so stale
    /// state cannot leak across the discontinuity.
    pub fn reset(&mut self) {
        self.channels.clear();
        self.live_ring.clear();
    }

    /// Records a live reference reading. Non-finite or non-positive
    /// readings are not reference material and are dropped.
    pub fn observe_live_ref(&mut self, value: f64) {
        if !value.is_finite() || value <= 0.0 {
            return;
        }
        self.live_ring.push_back(value);
        while self.live_ring.len() > self.config.live_ref_cap {
            self.live_ring.pop_front();
        }
    }

    pub fn latest_live_ref(&self) -> Option<f64> {
        self.live_ring.back().copied()
    }

    /// Whether the trailing live readings agree within the stability
    /// band. Decides how aggressively the live-gate may suppress
    /// history dips: an unstable reference means a real transition may
    /// be in progress.
    pub fn is_live_ref_stable(&self) -> bool {
        let n = self.config.stable_n;
        if self.live_ring.len() < n {
            return false;
        }
        let Some(&latest) = self.live_ring.back() else {
            return false;
        };
        self.live_ring
            .iter()
            .rev()
            .take(n)
            .all(|&v| rel_diff(v, latest) <= self.config.stable_band_rel)
    }

    fn live_ref_stepping(&self) -> bool {
        let len = self.live_ring.len();
        if len < 2 {
            return false;
        }
        rel_diff(self.live_ring[len - 1], self.live_ring[len - 2]) > self.config.gate_rel
    }

    pub fn last_accepted(&self, channel: Channel) -> Option<f64> {
        self.channels.get(&channel).and_then(|s| s.last_accepted)
    }

    /// Convenience wrapper returning just the plotted value.
    pub fn apply(
        &mut self,
        channel: Channel,
        raw: f64,
        policy: &GuardPolicy,
        live_ref: Option<f64>,
        confirm_override: Option<u32>,
    ) -> f64 {
        self.evaluate(channel, raw, policy, live_ref, confirm_override)
            .value
    }

    /// Decides what to plot for one raw sample.
    pub fn evaluate(
        &mut self,
        channel: Channel,
        raw: f64,
        policy: &GuardPolicy,
        live_ref: Option<f64>,
        confirm_override: Option<u32>,
    ) -> GuardVerdict {
        let confirm_needed = confirm_override.unwrap_or(self.config.confirm_samples).max(1);
        let live = finite_positive(live_ref);
        let live_stepping = self.live_ref_stepping();
        let live_stable = self.is_live_ref_stable();
        let cfg = self.config.clone();

        let state = self.channels.entry(channel).or_default();

        // Validity first; an invalid sample never touches the window
        // or the baseline, and it breaks any suspect run.
        if !policy.domain.contains(raw) {
            state.run_direction = 0;
            state.run_length = 0;
            let substitute = window_median(&state.window).or(state.last_accepted);
            return match substitute {
                Some(value) => GuardVerdict {
                    value,
                    decision: GuardDecision::SubstitutedInvalid,
                },
                None => GuardVerdict {
                    value: f64::NAN,
                    decision: GuardDecision::Gap,
                },
            };
        }

        // First sample seeds the baseline, live-corrected when the
        // candidate is far from a present reference (a stale persisted
        // artifact must not anchor the channel).
        let Some(prev) = state.last_accepted else {
            let mut value = raw;
            if policy.live_gated {
                if let Some(live) = live {
                    if rel_diff(raw, live) > cfg.gate_rel {
                        value = live;
                    }
                }
            }
            accept(state, &cfg, value);
            return GuardVerdict {
                value,
                decision: GuardDecision::Seeded,
            };
        };

        let step_rel = rel_diff(raw, prev);

        // Live gate. The gate widens while the reference itself is
        // stepping, and a big candidate step is let through to
        // confirmation as long as the reference has not yet proven
        // stable at its new level.
        if policy.live_gated {
            if let Some(live) = live {
                let gate = if live_stepping {
                    cfg.widened_gate_rel
                } else {
                    cfg.gate_rel
                };
                if rel_diff(raw, live) > gate {
                    let big_step_in_progress = step_rel >= cfg.big_step_rel && !live_stable;
                    if !big_step_in_progress {
                        state.run_direction = 0;
                        state.run_length = 0;
                        push_window(&mut state.window, cfg.window_cap, prev);
                        return GuardVerdict {
                            value: prev,
                            decision: GuardDecision::RejectedLiveGate,
                        };
                    }
                }
            }
        }

        // Step confirmation.
        if step_rel > policy.rel_threshold {
            // Fast path: a large step that matches the live reference
            // is a real change and should be visible within one tick.
            if step_rel >= cfg.big_step_rel {
                if let Some(live) = live {
                    if rel_diff(raw, live) <= cfg.gate_rel {
                        accept(state, &cfg, raw);
                        return GuardVerdict {
                            value: raw,
                            decision: GuardDecision::AcceptedBigStep,
                        };
                    }
                }
            }

            let direction: i8 = if raw > prev { 1 } else { -1 };
            if direction == state.run_direction {
                state.run_length += 1;
            } else {
                state.run_direction = direction;
                state.run_length = 1;
            }

            if state.run_length >= confirm_needed {
                accept(state, &cfg, raw);
                return GuardVerdict {
                    value: raw,
                    decision: GuardDecision::Accepted,
                };
            }

            push_window(&mut state.window, cfg.window_cap, prev);
            return GuardVerdict {
                value: prev,
                decision: GuardDecision::HeldSuspect,
            };
        }

        accept(state, &cfg, raw);
        GuardVerdict {
            value: raw,
            decision: GuardDecision::Accepted,
        }
    }

    #[cfg(test)]
    fn window_len(&self, channel: Channel) -> usize {
        self.channels.get(&channel).map_or(0, |s| s.window.len())
    }
}

fn accept(state: &mut ChannelState, cfg: &GuardConfig, value: f64) {
    state.last_accepted = Some(value);
    state.run_direction = 0;
    state.run_length = 0;
    push_window(&mut state.window, cfg.window_cap, value);
}

fn push_window(window: &mut VecDeque<f64>, cap: usize, value: f64) {
    window.push_back(value);
    while window.len() > cap {
        window.pop_front();
    }
}

fn window_median(window: &VecDeque<f64>) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_unstable_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}
