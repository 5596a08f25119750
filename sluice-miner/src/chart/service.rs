//! Chart service task.
//!
//! Owns the pipeline, watches the poller's info feed, starts history
//! backfills when the device reports a backlog, persists on an
//! interval and on shutdown, and answers console commands. Points come
//! from embedded history chunks when the device sends them; a poll
//! without history falls back to a wall-clock row. While a backfill
//! walks the backlog, live polls only feed warmup and the live
//! reference so they cannot leapfrog the walk.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::ChartConfig;
use super::console::{ChartCommand, ChartConsole};
use super::drain::{DrainSummary, HistoryDrainer, HistoryFetcher};
use super::pipeline::ChartPipeline;
use super::store::{ChartStore, StorageBackend};
use super::unix_ms_now;
use crate::api_client::types::DeviceInfo;
use crate::tracing::prelude::*;

pub struct ChartService {
    config: ChartConfig,
    pipeline: Arc<Mutex<ChartPipeline>>,
    store: ChartStore,
    fetcher: Arc<dyn HistoryFetcher>,
    info_rx: watch::Receiver<Option<DeviceInfo>>,
    cmd_rx: mpsc::Receiver<ChartCommand>,
    render: Arc<watch::Sender<u64>>,
    enabled: bool,
}

impl ChartService {
    /// Builds the service, restoring any persisted series. Returns the
    /// console handle and a render-revision receiver; the revision
    /// bumps whenever the plotted data may have changed.
    pub fn new(
        config: ChartConfig,
        fetcher: Arc<dyn HistoryFetcher>,
        info_rx: watch::Receiver<Option<DeviceInfo>>,
        backend: Box<dyn StorageBackend>,
    ) -> (Self, ChartConsole, watch::Receiver<u64>) {
        let store = ChartStore::new(backend);
        let state = store.load(config.load_cap).unwrap_or_default();
        if !state.is_empty() {
            info!(points = state.len(), "chart history restored");
        }
        let pipeline = Arc::new(Mutex::new(ChartPipeline::with_state(config.clone(), state)));
        let (console, cmd_rx) = ChartConsole::channel();
        let (render, render_rx) = watch::channel(0u64);
        let service = Self {
            config,
            pipeline,
            store,
            fetcher,
            info_rx,
            cmd_rx,
            render: Arc::new(render),
            enabled: true,
        };
        (service, console, render_rx)
    }

    /// Shared handle to the pipeline for read-side consumers.
    pub fn pipeline(&self) -> Arc<Mutex<ChartPipeline>> {
        self.pipeline.clone()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut persist = tokio::time::interval(self.config.persist_interval);
        persist.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (drain_tx, mut drain_rx) = mpsc::channel::<DrainSummary>(1);
        let mut drain_active = false;
        let mut cmd_open = true;

        info!("chart service started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.info_rx.changed() => {
                    if changed.is_err() {
                        debug!("info feed closed");
                        break;
                    }
                    let Some(info) = self.info_rx.borrow_and_update().clone() else {
                        continue;
                    };
                    if !self.enabled {
                        continue;
                    }
                    let start_from = self.apply_info(&info, drain_active);
                    if let Some(from) = start_from {
                        drain_active = true;
                        self.spawn_drain(from, &drain_tx, &cancel);
                    }
                    self.bump_render();
                }
                Some(summary) = drain_rx.recv() => {
                    drain_active = false;
                    info!(
                        chunks = summary.chunks,
                        appended = summary.appended,
                        completed = summary.completed,
                        "history backfill finished"
                    );
                    self.persist();
                }
                _ = persist.tick() => {
                    // Held back during a drain so every chunk does not
                    // rewrite storage.
                    if !drain_active {
                        self.persist();
                    }
                }
                cmd = self.cmd_rx.recv(), if cmd_open => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => cmd_open = false,
                },
            }
        }
        self.persist();
        info!("chart service stopped");
    }

    /// Routes one poll into the pipeline. Returns the cursor to start
    /// a backfill from when the device reports more backlog.
    fn apply_info(&mut self, info: &DeviceInfo, drain_active: bool) -> Option<i64> {
        let now = Instant::now();
        let wall_ms = unix_ms_now();
        let mut pipeline = self.pipeline.lock();
        match &info.history {
            Some(chunk) => {
                pipeline.observe_info_at(now, wall_ms, info);
                let report = pipeline.ingest_history(chunk);
                trace!(
                    appended = report.appended,
                    overwritten = report.overwritten,
                    skipped = report.skipped,
                    "embedded history merged"
                );
                (chunk.has_more && !drain_active)
                    .then(|| pipeline.last_ts_ms().map_or(0, |ts| ts + 1))
            }
            None if drain_active => {
                pipeline.observe_info_at(now, wall_ms, info);
                None
            }
            None => {
                pipeline.ingest_info_at(now, wall_ms, info);
                None
            }
        }
    }

    fn spawn_drain(
        &self,
        from_ms: i64,
        drain_tx: &mpsc::Sender<DrainSummary>,
        cancel: &CancellationToken,
    ) {
        info!(from_ms, "history backfill started");
        let drainer = HistoryDrainer::new(
            self.fetcher.clone(),
            self.config.drain.clone(),
            self.pipeline.clone(),
            self.render.clone(),
        );
        let tx = drain_tx.clone();
        let child = cancel.child_token();
        tokio::spawn(async move {
            let summary = drainer.drain(from_ms, &child).await;
            let _ = tx.send(summary).await;
        });
    }

    fn handle_command(&mut self, cmd: ChartCommand) {
        match cmd {
            ChartCommand::SetEnabled { enabled, reply } => {
                if self.enabled != enabled {
                    info!(enabled, "chart updates toggled");
                }
                self.enabled = enabled;
                let _ = reply.send(Ok(()));
            }
            ChartCommand::ClearHistory { reply } => {
                self.pipeline.lock().clear_history();
                self.store.clear();
                let _ = reply.send(Ok(()));
                self.bump_render();
            }
            ChartCommand::SetAxisPadding {
                group,
                padding,
                reply,
            } => {
                self.pipeline.lock().set_axis_padding(group, padding);
                let _ = reply.send(Ok(()));
                self.bump_render();
            }
            ChartCommand::FlushTick { reply } => {
                self.persist();
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn persist(&mut self) {
        let wall_ms = unix_ms_now();
        let pipeline = self.pipeline.lock();
        self.store.save(pipeline.state(), wall_ms);
    }

    fn bump_render(&self) {
        self.render.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}
