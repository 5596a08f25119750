//! Sequential history backfill.
//!
//! Walks the device's history endpoint one chunk at a time, feeding
//! each chunk through the pipeline before requesting the next. The
//! cursor advances past every timestamp seen, applied or not, so a
//! misbehaving device cannot stall the walk. Re-renders are throttled
//! while the walk runs and flushed once when it stops.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::config::DrainConfig;
use super::pipeline::ChartPipeline;
use crate::api_client::types::HistoryChunk;
use crate::tracing::prelude::*;

/// Source of history chunks, usually the device API client.
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    async fn fetch_history(&self, from_ms: i64, count: usize)
        -> crate::error::Result<HistoryChunk>;
}

/// What one drain run accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub chunks: usize,
    pub appended: usize,
    pub overwritten: usize,
    pub skipped: usize,
    /// The device reported no further chunks. `false` when the walk
    /// stopped on an error or cancellation.
    pub completed: bool,
}

pub struct HistoryDrainer {
    fetcher: Arc<dyn HistoryFetcher>,
    config: DrainConfig,
    pipeline: Arc<Mutex<ChartPipeline>>,
    render: Arc<watch::Sender<u64>>,
}

impl HistoryDrainer {
    pub fn new(
        fetcher: Arc<dyn HistoryFetcher>,
        config: DrainConfig,
        pipeline: Arc<Mutex<ChartPipeline>>,
        render: Arc<watch::Sender<u64>>,
    ) -> Self {
        Self {
            fetcher,
            config,
            pipeline,
            render,
        }
    }

    /// Drains history starting at `start_from_ms` until the device
    /// reports no more, an empty chunk arrives, a fetch fails, or the
    /// token cancels. Always ends with one unconditional render bump.
    pub async fn drain(&self, start_from_ms: i64, cancel: &CancellationToken) -> DrainSummary {
        let mut summary = DrainSummary::default();
        let mut cursor = start_from_ms.max(0);
        let mut last_render = tokio::time::Instant::now();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = self.fetcher.fetch_history(cursor, self.config.chunk_size) => {
                    match fetched {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            warn!(%err, from_ms = cursor, "history drain aborted");
                            break;
                        }
                    }
                }
            };

            let points = chunk.normalize();
            if points.is_empty() {
                if chunk.has_more {
                    warn!(from_ms = cursor, "empty history chunk claimed more data");
                } else {
                    summary.completed = true;
                }
                break;
            }

            if let Some(max_ts) = points.iter().map(|p| p.ts_ms).max() {
                cursor = max_ts + 1;
            }

            let report = self.pipeline.lock().ingest_history_points(&points);
            summary.chunks += 1;
            summary.appended += report.appended;
            summary.overwritten += report.overwritten;
            summary.skipped += report.skipped;

            if last_render.elapsed() >= self.config.render_throttle {
                self.bump_render();
                last_render = tokio::time::Instant::now();
            }

            if !chunk.has_more {
                summary.completed = true;
                break;
            }
        }

        // Soft stop: whatever landed since the last throttled render
        // becomes visible now.
        self.bump_render();
        debug!(
            chunks = summary.chunks,
            appended = summary.appended,
            skipped = summary.skipped,
            completed = summary.completed,
            "history drain finished"
        );
        summary
    }

    fn bump_render(&self) {
        self.render.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}
