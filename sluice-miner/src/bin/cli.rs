//! Command-line interface for sluice-miner.
//!
//! Talks to the device HTTP API for one-shot status, and runs the full
//! guarded chart pipeline in the terminal for live watching.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use sluice_miner::api_client::{Client, InfoPoller, PollerConfig, TelemetrySource};
use sluice_miner::chart::config::ChartConfig;
use sluice_miner::chart::drain::HistoryFetcher;
use sluice_miner::chart::pipeline::ChartPipeline;
use sluice_miner::chart::service::ChartService;
use sluice_miner::chart::store::{ChartStore, FileBackend};
use sluice_miner::chart::Channel;
use sluice_miner::types::HashRate;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: sluice-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status    Show device status");
        eprintln!("  watch     Follow the guarded telemetry chart");
        eprintln!("  clear     Wipe the persisted chart history");
        eprintln!();
        eprintln!("Environment:");
        eprintln!(
            "  SLUICE_API_URL      API base URL (default: {})",
            sluice_miner::api_client::DEFAULT_BASE_URL
        );
        eprintln!("  SLUICE_STATE_DIR    Chart persistence directory");
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "watch" => cmd_watch().await?,
        "clear" => cmd_clear()?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn state_dir() -> PathBuf {
    match env::var("SLUICE_STATE_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => env::temp_dir().join("sluice-chart"),
    }
}

/// Print a one-shot device snapshot.
async fn cmd_status() -> Result<()> {
    let client = Client::from_env();
    let info = client.get_info(None, 0).await?;

    println!("Uptime:     {} s", info.uptime_secs);
    println!(
        "System:     {}",
        if info.system_ok { "ok" } else { "NOT OK" }
    );
    println!("Hashrate:   {} (live)", HashRate(info.hashrate_hs));
    println!("Expected:   {}", HashRate(info.expected_hashrate_hs));
    println!("  1m:       {}", HashRate(info.hashrate_1m_hs));
    println!("  10m:      {}", HashRate(info.hashrate_10m_hs));
    println!("  1h:       {}", HashRate(info.hashrate_1h_hs));
    println!("  1d:       {}", HashRate(info.hashrate_1d_hs));
    println!("VR temp:    {:.1} C", info.vreg_temp_c);
    println!("ASIC temp:  {:.1} C", info.asic_temp_c);
    Ok(())
}

/// Run the poller and chart service, printing the newest guarded row
/// whenever the chart changes.
async fn cmd_watch() -> Result<()> {
    sluice_miner::tracing::init();

    let client = Arc::new(Client::from_env());
    println!("Watching {} (ctrl-c to stop)", client.base_url());

    let config = ChartConfig::default();
    let poller = Arc::new(InfoPoller::new(
        client.clone() as Arc<dyn TelemetrySource>,
        PollerConfig {
            interval: config.poll_interval,
            history_chunk: config.drain.chunk_size,
        },
    ));
    let (service, _console, mut render_rx) = ChartService::new(
        config,
        client.clone() as Arc<dyn HistoryFetcher>,
        poller.subscribe(),
        Box::new(FileBackend::new(state_dir())),
    );
    let pipeline = service.pipeline();

    let cancel = CancellationToken::new();
    let poller_task = poller.start(cancel.clone());
    let service_task = tokio::spawn(service.run(cancel.clone()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = render_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_newest_row(&pipeline);
            }
        }
    }

    cancel.cancel();
    let _ = poller_task.await;
    let _ = service_task.await;
    Ok(())
}

fn print_newest_row(pipeline: &Arc<Mutex<ChartPipeline>>) {
    let pipeline = pipeline.lock();
    let state = pipeline.state();
    let Some(index) = state.len().checked_sub(1) else {
        return;
    };
    let Some((ts_ms, row)) = state.row_at(index) else {
        return;
    };

    let clock = match time::OffsetDateTime::from_unix_timestamp(ts_ms / 1000) {
        Ok(t) => format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second()),
        Err(_) => ts_ms.to_string(),
    };
    let cell = |ch: Channel| {
        let v = row[ch.index()];
        if !v.is_finite() {
            "-".to_string()
        } else if ch.is_hashrate() {
            HashRate(v).to_string()
        } else {
            format!("{v:.1}C")
        }
    };
    println!(
        "{clock}  1m {:>7}  10m {:>7}  1h {:>7}  1d {:>7}  vr {:>6}  asic {:>6}  [{} pts]",
        cell(Channel::Hashrate1m),
        cell(Channel::Hashrate10m),
        cell(Channel::Hashrate1h),
        cell(Channel::Hashrate1d),
        cell(Channel::VregTemp),
        cell(Channel::AsicTemp),
        state.len(),
    );
}

/// Remove the persisted chart series.
fn cmd_clear() -> Result<()> {
    let mut store = ChartStore::new(Box::new(FileBackend::new(state_dir())));
    store.clear();
    println!("Chart history cleared.");
    Ok(())
}
