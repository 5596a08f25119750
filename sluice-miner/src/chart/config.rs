//! Chart tunables.
//!
//! The guard and warmup thresholds are empirically calibrated against
//! real device logs; treat changes as recalibration work (the replay
//! tool exists for exactly that), not refactoring.

use std::time::Duration;

use super::Channel;

/// Validity bounds for a channel, exclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDomain {
    pub min_valid: f64,
    pub max_valid: f64,
}

impl ValueDomain {
    /// Hashrate must be positive; the ceiling is far above anything
    /// this device class produces, so breaching it means a decode
    /// artifact rather than hashing.
    pub const HASHRATE: ValueDomain = ValueDomain {
        min_valid: 0.0,
        max_valid: 1.0e15,
    };

    /// Temperatures at or above 120 C are sensor garbage.
    pub const TEMPERATURE: ValueDomain = ValueDomain {
        min_valid: 0.0,
        max_valid: 120.0,
    };

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value > self.min_valid && value < self.max_valid
    }
}

/// Per-channel acceptance policy.
#[derive(Debug, Clone, Copy)]
pub struct GuardPolicy {
    /// Relative change beyond which a sample is suspicious.
    pub rel_threshold: f64,
    pub domain: ValueDomain,
    /// Whether samples are checked against the live reference.
    pub live_gated: bool,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Normal live-gate width.
    pub gate_rel: f64,
    /// Live-gate width while the live reference itself is stepping.
    pub widened_gate_rel: f64,
    /// Relative change that counts as a big step.
    pub big_step_rel: f64,
    /// Consecutive same-direction suspicious samples needed to accept.
    pub confirm_samples: u32,
    /// Rolling window of plotted values kept per channel.
    pub window_cap: usize,
    /// Live reference ring size.
    pub live_ref_cap: usize,
    /// How many trailing live samples must agree for stability.
    pub stable_n: usize,
    /// Band the trailing live samples must stay within.
    pub stable_band_rel: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            gate_rel: 0.06,
            widened_gate_rel: 0.80,
            big_step_rel: 0.20,
            confirm_samples: 2,
            window_cap: 9,
            live_ref_cap: 6,
            stable_n: 2,
            stable_band_rel: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Consecutive boot-like polls before the chart locks.
    pub restart_detect_streak: u32,
    pub vreg_delay: Duration,
    pub asic_delay: Duration,
    pub hash_delay: Duration,
    /// Live/expected ratio treated as "device back at speed".
    pub unlock_ratio: f64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            restart_detect_streak: 3,
            vreg_delay: Duration::from_secs(5),
            asic_delay: Duration::from_secs(5),
            hash_delay: Duration::from_secs(10),
            unlock_ratio: 0.98,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Points requested per history chunk.
    pub chunk_size: usize,
    /// Minimum spacing between render notifications while draining.
    pub render_throttle: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: 360,
            render_throttle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChartConfig {
    /// Plotted viewport; older points are trimmed.
    pub viewport: Duration,
    /// Hard cap on points held in memory or loaded from storage.
    pub load_cap: usize,
    pub poll_interval: Duration,
    pub persist_interval: Duration,
    pub rel_threshold_hashrate: f64,
    pub rel_threshold_temperature: f64,
    pub guard: GuardConfig,
    pub warmup: WarmupConfig,
    pub drain: DrainConfig,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            viewport: Duration::from_secs(3600),
            load_cap: 20_000,
            poll_interval: Duration::from_secs(3),
            persist_interval: Duration::from_secs(10),
            rel_threshold_hashrate: 0.30,
            rel_threshold_temperature: 0.25,
            guard: GuardConfig::default(),
            warmup: WarmupConfig::default(),
            drain: DrainConfig::default(),
        }
    }
}

impl ChartConfig {
    /// Acceptance policy for a channel. Only the 1-minute hashrate is
    /// live-gated: the longer averages legitimately sag while their
    /// windows refill after a restart, and gating them against the
    /// live rate would reject honest data.
    pub fn policy(&self, channel: Channel) -> GuardPolicy {
        if channel.is_hashrate() {
            GuardPolicy {
                rel_threshold: self.rel_threshold_hashrate,
                domain: ValueDomain::HASHRATE,
                live_gated: channel == Channel::Hashrate1m,
            }
        } else {
            GuardPolicy {
                rel_threshold: self.rel_threshold_temperature,
                domain: ValueDomain::TEMPERATURE,
                live_gated: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Channel::Hashrate1m, true, true; "hr1m is gated hashrate")]
    #[test_case(Channel::Hashrate10m, true, false; "hr10m is ungated hashrate")]
    #[test_case(Channel::Hashrate1h, true, false; "hr1h is ungated hashrate")]
    #[test_case(Channel::Hashrate1d, true, false; "hr1d is ungated hashrate")]
    #[test_case(Channel::VregTemp, false, false; "vreg temp is ungated")]
    #[test_case(Channel::AsicTemp, false, false; "asic temp is ungated")]
    fn policies_per_channel(channel: Channel, hashrate_domain: bool, live_gated: bool) {
        let config = ChartConfig::default();
        let policy = config.policy(channel);
        assert_eq!(policy.live_gated, live_gated);
        if hashrate_domain {
            assert_eq!(policy.domain, ValueDomain::HASHRATE);
            assert_eq!(policy.rel_threshold, config.rel_threshold_hashrate);
        } else {
            assert_eq!(policy.domain, ValueDomain::TEMPERATURE);
            assert_eq!(policy.rel_threshold, config.rel_threshold_temperature);
        }
    }

    #[test_case(59.5, true; "normal temperature")]
    #[test_case(119.9, true; "hot but plausible")]
    #[test_case(120.0, false; "at the ceiling")]
    #[test_case(0.0, false; "zero reads as missing sensor")]
    #[test_case(-3.0, false; "negative")]
    #[test_case(f64::NAN, false; "nan")]
    #[test_case(f64::INFINITY, false; "infinite")]
    fn temperature_domain(value: f64, valid: bool) {
        assert_eq!(ValueDomain::TEMPERATURE.contains(value), valid);
    }

    #[test_case(9.2e12, true; "device class rate")]
    #[test_case(0.0, false; "zero is not hashing")]
    #[test_case(1.0e15, false; "at the ceiling")]
    #[test_case(-1.0, false; "negative")]
    fn hashrate_domain(value: f64, valid: bool) {
        assert_eq!(ValueDomain::HASHRATE.contains(value), valid);
    }
}
