//! Periodic info polling.
//!
//! One fetch in flight at a time: the loop awaits the current fetch
//! before asking the ticker again, and missed ticks are skipped rather
//! than queued. Consumers share a single watch channel holding the
//! latest snapshot.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use super::{DeviceInfo, TelemetrySource};
use crate::tracing::prelude::*;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Points requested for the embedded history window.
    pub history_chunk: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            history_chunk: 360,
        }
    }
}

/// Polls the device on a fixed cadence and publishes the latest
/// snapshot. A failed poll keeps the previous snapshot in place.
pub struct InfoPoller {
    source: Arc<dyn TelemetrySource>,
    config: PollerConfig,
    latest: watch::Sender<Option<DeviceInfo>>,
    cursor: Arc<AtomicI64>,
}

impl InfoPoller {
    pub fn new(source: Arc<dyn TelemetrySource>, config: PollerConfig) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            source,
            config,
            latest,
            cursor: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceInfo>> {
        self.latest.subscribe()
    }

    /// Stream adapter over [`subscribe`](Self::subscribe).
    pub fn stream(&self) -> WatchStream<Option<DeviceInfo>> {
        WatchStream::new(self.subscribe())
    }

    /// Anchor for the embedded history window of subsequent polls.
    /// Normally advanced to the last charted timestamp after ingest.
    pub fn set_history_cursor(&self, ts_ms: i64) {
        self.cursor.store(ts_ms, Ordering::Relaxed);
    }

    /// Shared cursor handle, for callers that outlive the poller ref.
    pub fn history_cursor(&self) -> Arc<AtomicI64> {
        self.cursor.clone()
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "info poller running"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("info poller stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let from = self.cursor.load(Ordering::Relaxed);
                    match self.source.fetch_info(from, self.config.history_chunk).await {
                        Ok(info) => {
                            // Next poll's window starts past everything
                            // this one embedded.
                            if let Some(ts) = info.history.as_ref().and_then(|c| c.newest_ts_ms()) {
                                self.cursor.fetch_max(ts + 1, Ordering::Relaxed);
                            }
                            self.latest.send_replace(Some(info));
                        }
                        Err(err) => warn!(%err, "info poll failed"),
                    }
                }
            }
        }
    }
}
