//! Restart gating.
//!
//! A miner restart makes sensors and the live hashrate simultaneously
//! unreliable for a short window; plotting through it produces a false
//! collapse to zero. The machine locks the chart on a confirmed
//! boot-like streak, terminates the old curves with one explicit gap,
//! and re-enables channels in a fixed order as each reading becomes
//! trustworthy again:
//!
//! ```text
//! READY -> LOCKED -> VREG_DELAY -> WAIT_ASIC -> ASIC_DELAY
//!       -> WAIT_HASH_LIVE -> HASH_DELAY -> WAIT_HASH_FLOW -> READY
//! ```

use std::time::Instant;

use super::config::WarmupConfig;
use super::Channel;

bitflags::bitflags! {
    /// Which channels may currently emit points.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelMask: u8 {
        const VREG_TEMP = 1 << 0;
        const ASIC_TEMP = 1 << 1;
        const HR_1M = 1 << 2;
        /// The 10m/1h/1d hashrate channels, unlocked together last.
        const HR_REST = 1 << 3;
    }
}

impl ChannelMask {
    pub fn allows(self, channel: Channel) -> bool {
        let needed = match channel {
            Channel::VregTemp => ChannelMask::VREG_TEMP,
            Channel::AsicTemp => ChannelMask::ASIC_TEMP,
            Channel::Hashrate1m => ChannelMask::HR_1M,
            Channel::Hashrate10m | Channel::Hashrate1h | Channel::Hashrate1d => {
                ChannelMask::HR_REST
            }
        };
        self.contains(needed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WarmupStage {
    Ready,
    Locked,
    VregDelay,
    WaitAsic,
    AsicDelay,
    WaitHashLive,
    HashDelay,
    WaitHashFlow,
}

/// One poll's worth of health signals, already reduced to booleans by
/// the caller (the unlock ratio and temperature domains live there).
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveProbe {
    pub system_ok: bool,
    /// Live hashrate at or above the expected rate.
    pub unlocked: bool,
    /// Live hashrate present at all.
    pub hashing: bool,
    pub vreg_temp_ok: bool,
    pub asic_temp_ok: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WarmupStatus {
    pub stage: WarmupStage,
    pub enabled: ChannelMask,
}

pub struct WarmupMachine {
    config: WarmupConfig,
    stage: WarmupStage,
    enabled: ChannelMask,
    break_pending: bool,
    boot_streak: u32,
    stage_entered: Option<Instant>,
}

impl WarmupMachine {
    pub fn new(config: WarmupConfig) -> Self {
        Self {
            config,
            stage: WarmupStage::Ready,
            enabled: ChannelMask::all(),
            break_pending: false,
            boot_streak: 0,
            stage_entered: None,
        }
    }

    pub fn stage(&self) -> WarmupStage {
        self.stage
    }

    pub fn enabled(&self) -> ChannelMask {
        self.enabled
    }

    /// True while no new points should be appended at all. The curves
    /// were already terminated by the gap marker when the lock fired.
    pub fn is_locked(&self) -> bool {
        matches!(self.stage, WarmupStage::Locked | WarmupStage::VregDelay)
    }

    /// True while boot-like polls are accumulating toward the lock
    /// threshold. Samples in this window are suspect: plotting them
    /// would smear the pre-restart curve with held values right before
    /// the break terminates it.
    pub fn boot_suspected(&self) -> bool {
        self.boot_streak > 0
    }

    /// One-shot: true exactly once after each lock, then false until
    /// the next restart. The caller owes the chart one all-gap row.
    pub fn consume_break_pending(&mut self) -> bool {
        std::mem::take(&mut self.break_pending)
    }

    /// Completes the cycle once the 1-minute channel has produced a
    /// finite sample: the remaining hashrate channels unlock.
    pub fn notify_hr1m_flow(&mut self) {
        if self.stage == WarmupStage::WaitHashFlow {
            self.enabled |= ChannelMask::HR_REST;
            self.stage = WarmupStage::Ready;
            self.stage_entered = None;
        }
    }

    /// Feeds one poll into the machine; at most one stage transition
    /// per call. A boot-like poll never advances the ladder.
    pub fn observe_live_at(&mut self, now: Instant, probe: &LiveProbe) -> WarmupStatus {
        if self.boot_like(probe) {
            self.boot_streak += 1;
            if self.boot_streak >= self.config.restart_detect_streak {
                self.lock();
            }
            return self.status();
        }
        self.boot_streak = 0;

        match self.stage {
            WarmupStage::Ready | WarmupStage::WaitHashFlow => {}
            WarmupStage::Locked => {
                if probe.vreg_temp_ok {
                    self.enter(WarmupStage::VregDelay, now);
                }
            }
            WarmupStage::VregDelay => {
                if self.stage_elapsed(now) >= self.config.vreg_delay {
                    self.enabled |= ChannelMask::VREG_TEMP;
                    self.enter(WarmupStage::WaitAsic, now);
                }
            }
            WarmupStage::WaitAsic => {
                if probe.asic_temp_ok {
                    self.enter(WarmupStage::AsicDelay, now);
                }
            }
            WarmupStage::AsicDelay => {
                if self.stage_elapsed(now) >= self.config.asic_delay {
                    self.enabled |= ChannelMask::ASIC_TEMP;
                    self.enter(WarmupStage::WaitHashLive, now);
                }
            }
            WarmupStage::WaitHashLive => {
                if probe.hashing && probe.unlocked {
                    self.enter(WarmupStage::HashDelay, now);
                }
            }
            WarmupStage::HashDelay => {
                if self.stage_elapsed(now) >= self.config.hash_delay {
                    self.enabled |= ChannelMask::HR_1M;
                    self.enter(WarmupStage::WaitHashFlow, now);
                }
            }
        }

        self.status()
    }

    fn status(&self) -> WarmupStatus {
        WarmupStatus {
            stage: self.stage,
            enabled: self.enabled,
        }
    }

    /// Whether this poll looks like the device is (re)booting. The
    /// full predicate applies only in `Ready`; once warmup is under
    /// way, only a sustained system failure re-locks, since missing
    /// hashrate and implausible temperatures are the expected shape of
    /// the warmup itself. While already locked nothing counts.
    fn boot_like(&self, probe: &LiveProbe) -> bool {
        match self.stage {
            WarmupStage::Ready => {
                !probe.system_ok
                    || (!probe.unlocked
                        && (!probe.hashing || !probe.vreg_temp_ok || !probe.asic_temp_ok))
            }
            WarmupStage::Locked | WarmupStage::VregDelay => false,
            _ => !probe.system_ok,
        }
    }

    fn lock(&mut self) {
        self.stage = WarmupStage::Locked;
        self.enabled = ChannelMask::empty();
        self.break_pending = true;
        self.boot_streak = 0;
        self.stage_entered = None;
    }

    fn enter(&mut self, stage: WarmupStage, now: Instant) {
        self.stage = stage;
        self.stage_entered = Some(now);
    }

    fn stage_elapsed(&mut self, now: Instant) -> std::time::Duration {
        let entered = *self.stage_entered.get_or_insert(now);
        now.duration_since(entered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn machine() -> WarmupMachine {
        WarmupMachine::new(WarmupConfig::default())
    }

    fn healthy() -> LiveProbe {
        LiveProbe {
            system_ok: true,
            unlocked: true,
            hashing: true,
            vreg_temp_ok: true,
            asic_temp_ok: true,
        }
    }

    fn booting() -> LiveProbe {
        LiveProbe::default()
    }

    /// Drives a machine from READY into LOCKED.
    fn lock(m: &mut WarmupMachine, base: Instant) {
        for i in 0..3 {
            m.observe_live_at(base + Duration::from_secs(3 * i), &booting());
        }
        assert_eq!(m.stage(), WarmupStage::Locked);
    }

    #[test]
    fn starts_ready_with_all_channels_enabled() {
        let m = machine();
        assert_eq!(m.stage(), WarmupStage::Ready);
        assert_eq!(m.enabled(), ChannelMask::all());
        assert!(!m.is_locked());
    }

    #[test]
    fn boot_streak_locks_and_arms_one_break() {
        let mut m = machine();
        let base = Instant::now();

        m.observe_live_at(base, &booting());
        m.observe_live_at(base + Duration::from_secs(3), &booting());
        assert_eq!(m.stage(), WarmupStage::Ready);
        assert!(!m.consume_break_pending());

        m.observe_live_at(base + Duration::from_secs(6), &booting());
        assert_eq!(m.stage(), WarmupStage::Locked);
        assert_eq!(m.enabled(), ChannelMask::empty());
        assert!(m.consume_break_pending());
        assert!(!m.consume_break_pending());
    }

    #[test]
    fn boot_suspicion_tracks_the_streak() {
        let mut m = machine();
        let base = Instant::now();
        assert!(!m.boot_suspected());

        m.observe_live_at(base, &booting());
        assert!(m.boot_suspected());
        m.observe_live_at(base + Duration::from_secs(3), &healthy());
        assert!(!m.boot_suspected());

        // A confirmed streak locks and the counter starts over.
        lock(&mut m, base + Duration::from_secs(6));
        assert!(!m.boot_suspected());
    }

    #[test]
    fn interrupted_streak_starts_over() {
        let mut m = machine();
        let base = Instant::now();

        m.observe_live_at(base, &booting());
        m.observe_live_at(base + Duration::from_secs(3), &booting());
        m.observe_live_at(base + Duration::from_secs(6), &healthy());
        m.observe_live_at(base + Duration::from_secs(9), &booting());
        m.observe_live_at(base + Duration::from_secs(12), &booting());
        assert_eq!(m.stage(), WarmupStage::Ready);

        m.observe_live_at(base + Duration::from_secs(15), &booting());
        assert_eq!(m.stage(), WarmupStage::Locked);
    }

    #[test]
    fn not_hashing_counts_as_boot_like_only_without_unlock() {
        let mut m = machine();
        let base = Instant::now();
        let idle = LiveProbe {
            system_ok: true,
            unlocked: true,
            hashing: true,
            vreg_temp_ok: false,
            asic_temp_ok: true,
        };
        // Unlocked device with one odd sensor is not a restart.
        for i in 0..5 {
            m.observe_live_at(base + Duration::from_secs(3 * i), &idle);
        }
        assert_eq!(m.stage(), WarmupStage::Ready);
    }

    #[test]
    fn full_ladder_reenables_channels_in_order() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        let mut t = base + Duration::from_secs(9);
        let mut at = |t: &mut Instant, secs: u64| {
            *t += Duration::from_secs(secs);
            *t
        };

        // VR temp recovers; the delay starts counting.
        let vreg_up = LiveProbe {
            system_ok: true,
            vreg_temp_ok: true,
            ..LiveProbe::default()
        };
        m.observe_live_at(at(&mut t, 3), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::VregDelay);
        assert!(m.is_locked());
        assert_eq!(m.enabled(), ChannelMask::empty());

        // Not enough delay yet.
        m.observe_live_at(at(&mut t, 3), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::VregDelay);

        m.observe_live_at(at(&mut t, 3), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);
        assert_eq!(m.enabled(), ChannelMask::VREG_TEMP);
        assert!(!m.is_locked());

        // ASIC temp recovers.
        let asic_up = LiveProbe {
            asic_temp_ok: true,
            ..vreg_up
        };
        m.observe_live_at(at(&mut t, 3), &asic_up);
        assert_eq!(m.stage(), WarmupStage::AsicDelay);
        m.observe_live_at(at(&mut t, 6), &asic_up);
        assert_eq!(m.stage(), WarmupStage::WaitHashLive);
        assert_eq!(m.enabled(), ChannelMask::VREG_TEMP | ChannelMask::ASIC_TEMP);

        // Hashing but below the unlock ratio: keep waiting.
        let hashing_slow = LiveProbe {
            hashing: true,
            unlocked: false,
            ..asic_up
        };
        m.observe_live_at(at(&mut t, 3), &hashing_slow);
        assert_eq!(m.stage(), WarmupStage::WaitHashLive);

        let hashing_full = LiveProbe {
            unlocked: true,
            ..hashing_slow
        };
        m.observe_live_at(at(&mut t, 3), &hashing_full);
        assert_eq!(m.stage(), WarmupStage::HashDelay);
        m.observe_live_at(at(&mut t, 11), &hashing_full);
        assert_eq!(m.stage(), WarmupStage::WaitHashFlow);
        assert!(m.enabled().allows(Channel::Hashrate1m));
        assert!(!m.enabled().allows(Channel::Hashrate10m));

        // First finite 1m sample completes the cycle.
        m.notify_hr1m_flow();
        assert_eq!(m.stage(), WarmupStage::Ready);
        assert_eq!(m.enabled(), ChannelMask::all());
    }

    #[test]
    fn hr1m_flow_is_ignored_outside_wait_hash_flow() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        m.notify_hr1m_flow();
        assert_eq!(m.stage(), WarmupStage::Locked);
        assert_eq!(m.enabled(), ChannelMask::empty());
    }

    #[test]
    fn system_failure_relocks_mid_warmup() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        assert!(m.consume_break_pending());

        // Walk to WAIT_ASIC.
        let vreg_up = LiveProbe {
            system_ok: true,
            vreg_temp_ok: true,
            ..LiveProbe::default()
        };
        m.observe_live_at(base + Duration::from_secs(9), &vreg_up);
        m.observe_live_at(base + Duration::from_secs(15), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);

        let failing = LiveProbe {
            system_ok: false,
            asic_temp_ok: true,
            ..vreg_up
        };
        for i in 0..3 {
            m.observe_live_at(base + Duration::from_secs(18 + 3 * i), &failing);
        }
        assert_eq!(m.stage(), WarmupStage::Locked);
        assert!(m.consume_break_pending());
    }

    #[test]
    fn missing_hashrate_does_not_relock_mid_warmup() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);

        let vreg_up = LiveProbe {
            system_ok: true,
            vreg_temp_ok: true,
            ..LiveProbe::default()
        };
        m.observe_live_at(base + Duration::from_secs(9), &vreg_up);
        m.observe_live_at(base + Duration::from_secs(15), &vreg_up);
        m.observe_live_at(base + Duration::from_secs(18), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);

        // No hashing yet is the normal shape of warmup, not a restart.
        for i in 0..6 {
            m.observe_live_at(base + Duration::from_secs(21 + 3 * i), &vreg_up);
        }
        assert_eq!(m.stage(), WarmupStage::WaitAsic);
    }

    #[test]
    fn locked_absorbs_further_boot_polls() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        assert!(m.consume_break_pending());

        for i in 0..5 {
            m.observe_live_at(base + Duration::from_secs(9 + 3 * i), &booting());
        }
        assert_eq!(m.stage(), WarmupStage::Locked);
        // No second break while still locked.
        assert!(!m.consume_break_pending());
    }

    #[test]
    fn degraded_poll_does_not_advance_the_ladder() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        let vreg_up = LiveProbe {
            system_ok: true,
            vreg_temp_ok: true,
            ..LiveProbe::default()
        };
        m.observe_live_at(base + Duration::from_secs(9), &vreg_up);
        m.observe_live_at(base + Duration::from_secs(15), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);

        // ASIC temp looks fine but the system flag dropped; the poll
        // counts toward re-lock instead of advancing.
        let failing = LiveProbe {
            system_ok: false,
            asic_temp_ok: true,
            ..vreg_up
        };
        m.observe_live_at(base + Duration::from_secs(18), &failing);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);
    }

    #[test]
    fn lock_scope_is_locked_and_vreg_delay_only() {
        let mut m = machine();
        let base = Instant::now();
        lock(&mut m, base);
        assert!(m.is_locked());

        let vreg_up = LiveProbe {
            system_ok: true,
            vreg_temp_ok: true,
            ..LiveProbe::default()
        };
        m.observe_live_at(base + Duration::from_secs(9), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::VregDelay);
        assert!(m.is_locked());

        m.observe_live_at(base + Duration::from_secs(15), &vreg_up);
        assert_eq!(m.stage(), WarmupStage::WaitAsic);
        assert!(!m.is_locked());
    }

    #[test]
    fn mask_maps_channels() {
        let mask = ChannelMask::VREG_TEMP | ChannelMask::HR_1M;
        assert!(mask.allows(Channel::VregTemp));
        assert!(mask.allows(Channel::Hashrate1m));
        assert!(!mask.allows(Channel::AsicTemp));
        assert!(!mask.allows(Channel::Hashrate1h));
        assert!(ChannelMask::all().allows(Channel::Hashrate1d));
    }
}
