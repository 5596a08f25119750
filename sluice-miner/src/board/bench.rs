//! Virtual bench board.
//!
//! A synthetic eight-chip chain that advances free-running counters at
//! a fixed per-chip rate, so the full measurement pipeline runs without
//! hardware. Counters are 32-bit and wrap exactly like the silicon
//! ones; the tick rate is kept well under one wrap per sampling
//! interval so consecutive deltas stay unambiguous.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use super::{Board, BoardError, VirtualBoardDescriptor};
use crate::asic::{Asic, AsicError, CounterSink};
use crate::hashrate::ERRATA_FACTOR;

const BENCH_CHIP_COUNT: usize = 8;
const BENCH_CHIP_MODEL: &str = "BM1370";

/// Counter increments per second per chip.
const BENCH_COUNTS_PER_SEC: f64 = 2.3e8;

struct ChipCounter {
    counter: u32,
    last_advance: Option<Instant>,
}

struct BenchState {
    chips: Vec<ChipCounter>,
    sink: Option<Arc<dyn CounterSink>>,
}

/// Synthetic ASIC chain backing [`BenchBoard`].
pub struct BenchAsic {
    counts_per_sec: f64,
    state: Mutex<BenchState>,
}

impl BenchAsic {
    fn new(chip_count: usize, counts_per_sec: f64) -> Self {
        let chips = (0..chip_count)
            .map(|i| ChipCounter {
                // Stagger the starting points near the top of the range
                // so wraparound is hit early, at different times across
                // the chain.
                counter: u32::MAX - (i as u32) * 50_000,
                last_advance: None,
            })
            .collect();
        Self {
            counts_per_sec,
            state: Mutex::new(BenchState { chips, sink: None }),
        }
    }
}

#[async_trait]
impl Asic for BenchAsic {
    fn model(&self) -> &str {
        BENCH_CHIP_MODEL
    }

    async fn trigger_counter_read(&self) -> Result<(), AsicError> {
        let now = Instant::now();
        let mut replies = Vec::new();
        let sink = {
            let mut state = self.state.lock();
            for (idx, chip) in state.chips.iter_mut().enumerate() {
                if let Some(last) = chip.last_advance {
                    let elapsed = now.duration_since(last).as_secs_f64();
                    // u64 -> u32 truncation gives the modular advance of
                    // a free-running 32-bit counter.
                    let step = (self.counts_per_sec * elapsed) as u64 as u32;
                    chip.counter = chip.counter.wrapping_add(step);
                }
                chip.last_advance = Some(now);
                replies.push((idx, chip.counter));
            }
            state.sink.clone()
        };

        let sink = sink.ok_or(AsicError::NotReady)?;
        for (idx, counter) in replies {
            sink.on_register_reply(idx, counter);
        }
        Ok(())
    }

    fn set_counter_sink(&self, sink: Arc<dyn CounterSink>) {
        self.state.lock().sink = Some(sink);
    }
}

/// Deterministic synthetic board, device type "bench".
pub struct BenchBoard {
    asic: Arc<BenchAsic>,
}

impl BenchBoard {
    pub fn new() -> Self {
        Self {
            asic: Arc::new(BenchAsic::new(BENCH_CHIP_COUNT, BENCH_COUNTS_PER_SEC)),
        }
    }
}

impl Default for BenchBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Board for BenchBoard {
    fn model(&self) -> &str {
        "Bench Octa"
    }

    fn chip_count(&self) -> usize {
        BENCH_CHIP_COUNT
    }

    fn expected_hashrate_hs(&self) -> f64 {
        // What the monitor will report once settled: the counter rate
        // scaled by the errata correction it applies.
        BENCH_CHIP_COUNT as f64 * BENCH_COUNTS_PER_SEC * ERRATA_FACTOR
    }

    fn asic(&self) -> Arc<dyn Asic> {
        self.asic.clone()
    }

    async fn shutdown(&mut self) -> Result<(), BoardError> {
        // Nothing to power down; counters simply stop advancing.
        Ok(())
    }
}

fn create_bench_board() -> super::BoxFuture<'static, crate::error::Result<Box<dyn Board>>> {
    Box::pin(async { Ok(Box::new(BenchBoard::new()) as Box<dyn Board>) })
}

inventory::submit! {
    VirtualBoardDescriptor {
        device_type: "bench",
        name: "Bench Octa",
        create_fn: create_bench_board,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct RecordingSink {
        replies: PlMutex<Vec<(usize, u32)>>,
    }

    impl CounterSink for RecordingSink {
        fn on_register_reply(&self, chip: usize, counter_now: u32) {
            self.replies.lock().push((chip, counter_now));
        }
    }

    #[tokio::test]
    async fn trigger_without_sink_is_not_ready() {
        let asic = BenchAsic::new(2, 1.0e8);
        let err = asic.trigger_counter_read().await.unwrap_err();
        assert!(matches!(err, AsicError::NotReady));
    }

    #[tokio::test]
    async fn trigger_delivers_one_reply_per_chip() {
        let asic = BenchAsic::new(4, 1.0e8);
        let sink = Arc::new(RecordingSink {
            replies: PlMutex::new(Vec::new()),
        });
        asic.set_counter_sink(sink.clone());

        asic.trigger_counter_read().await.unwrap();

        let replies = sink.replies.lock();
        assert_eq!(replies.len(), 4);
        let chips: Vec<usize> = replies.iter().map(|&(c, _)| c).collect();
        assert_eq!(chips, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn counters_advance_between_triggers() {
        let asic = BenchAsic::new(1, 1.0e8);
        let sink = Arc::new(RecordingSink {
            replies: PlMutex::new(Vec::new()),
        });
        asic.set_counter_sink(sink.clone());

        asic.trigger_counter_read().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        asic.trigger_counter_read().await.unwrap();

        let replies = sink.replies.lock();
        assert_eq!(replies.len(), 2);
        assert_ne!(replies[0].1, replies[1].1);
    }

    #[test]
    fn board_reports_expected_rate() {
        let board = BenchBoard::new();
        assert_eq!(board.chip_count(), 8);
        assert_eq!(
            board.expected_hashrate_hs(),
            8.0 * BENCH_COUNTS_PER_SEC * ERRATA_FACTOR
        );
        assert_eq!(board.model(), "Bench Octa");
        assert_eq!(board.asic().model(), "BM1370");
    }
}
