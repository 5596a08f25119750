//! Miner telemetry daemon.
//!
//! Brings up a board, attaches the hashrate monitor to its ASIC chain
//! and logs the measured rate until interrupted.
//!
//! Environment:
//!   SLUICE_BOARD   board device type (default: bench)
//!   SLUICE_LOG     log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use sluice_miner::board::VirtualBoardRegistry;
use sluice_miner::hashrate::{HashrateMonitor, MonitorConfig};
use sluice_miner::types::HashRate;

#[tokio::main]
async fn main() -> Result<()> {
    sluice_miner::tracing::init();

    let device_type = std::env::var("SLUICE_BOARD").unwrap_or_else(|_| "bench".to_string());
    let mut board = VirtualBoardRegistry
        .create(&device_type)
        .await
        .with_context(|| format!("creating board '{device_type}'"))?;

    info!(
        model = board.model(),
        chips = board.chip_count(),
        expected = %HashRate(board.expected_hashrate_hs()),
        "board up"
    );

    let monitor = Arc::new(
        HashrateMonitor::new(board.chip_count(), MonitorConfig::default())
            .context("initializing hashrate monitor")?,
    );

    let asic = board.asic();
    asic.set_counter_sink(monitor.clone());

    let cancel = CancellationToken::new();
    let monitor_task = monitor.clone().start(asic, cancel.clone());

    let status_task = {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(15));
            // Skip the immediate first tick; there is nothing to report
            // before the first sample cycle.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        info!(
                            smoothed = %monitor.smoothed_hashrate(),
                            raw = %monitor.hashrate(),
                            "board hashrate"
                        );
                    }
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();
    let _ = monitor_task.await;
    let _ = status_task.await;
    board.shutdown().await.context("board shutdown")?;
    Ok(())
}
