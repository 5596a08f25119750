//! Replay captured telemetry through the chart pipeline.
//!
//! Feeds a JSON-lines capture of `/api/v0/info` polls through the same
//! guard and warmup logic the live chart runs, showing what each
//! sample did to the plotted series. This is how guard thresholds get
//! recalibrated against real device logs instead of guesswork.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::Parser;
use colored::{ColoredString, Colorize};

use sluice_miner::chart::config::ChartConfig;
use sluice_miner::chart::guard::GuardDecision;
use sluice_miner::chart::pipeline::{ChartPipeline, IngestOutcome};
use sluice_miner::chart::Channel;

mod capture;

#[derive(Parser)]
#[command(
    name = "sluice-replay",
    about = "Replay captured miner telemetry through the chart guard"
)]
struct Args {
    /// JSON-lines capture of /api/v0/info polls
    capture: PathBuf,

    /// Only print polls where the guard or warmup intervened
    #[arg(long)]
    interventions_only: bool,

    /// Override the hashrate step threshold
    #[arg(long)]
    hashrate_threshold: Option<f64>,

    /// Override the temperature step threshold
    #[arg(long)]
    temperature_threshold: Option<f64>,
}

const DECISION_NAMES: [&str; 7] = [
    "seeded",
    "accepted",
    "big-step",
    "held",
    "live-gate",
    "substituted",
    "gap",
];

fn decision_slot(decision: GuardDecision) -> usize {
    match decision {
        GuardDecision::Seeded => 0,
        GuardDecision::Accepted => 1,
        GuardDecision::AcceptedBigStep => 2,
        GuardDecision::HeldSuspect => 3,
        GuardDecision::RejectedLiveGate => 4,
        GuardDecision::SubstitutedInvalid => 5,
        GuardDecision::Gap => 6,
    }
}

fn is_intervention(decision: GuardDecision) -> bool {
    !matches!(decision, GuardDecision::Seeded | GuardDecision::Accepted)
}

fn paint(decision: GuardDecision) -> ColoredString {
    let label = decision.to_string();
    match decision {
        GuardDecision::Seeded | GuardDecision::Accepted => label.as_str().green(),
        GuardDecision::AcceptedBigStep => label.as_str().cyan(),
        GuardDecision::HeldSuspect => label.as_str().yellow(),
        GuardDecision::RejectedLiveGate => label.as_str().red(),
        GuardDecision::SubstitutedInvalid => label.as_str().magenta(),
        GuardDecision::Gap => label.as_str().dimmed(),
    }
}

fn clock(ts_ms: i64) -> String {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| ts_ms.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let records = capture::read_records(&args.capture)?;
    if records.is_empty() {
        println!("Capture is empty.");
        return Ok(());
    }

    let mut config = ChartConfig::default();
    if let Some(threshold) = args.hashrate_threshold {
        config.rel_threshold_hashrate = threshold;
    }
    if let Some(threshold) = args.temperature_threshold {
        config.rel_threshold_temperature = threshold;
    }

    let mut pipeline = ChartPipeline::new(config);
    let base_instant = Instant::now();
    let base_ts = records[0].ts_ms;
    let mut last_stage = pipeline.stage();
    let mut totals = [0usize; DECISION_NAMES.len()];
    let mut breaks = 0usize;

    for record in &records {
        // Captured wall-clock spacing becomes monotonic-clock spacing
        // so warmup delays elapse exactly as they did live.
        let offset_ms = (record.ts_ms - base_ts).max(0) as u64;
        let now = base_instant + Duration::from_millis(offset_ms);
        let outcome = pipeline.ingest_info_at(now, record.ts_ms, &record.info);

        for decision in outcome.verdicts.into_iter().flatten() {
            totals[decision_slot(decision)] += 1;
        }
        if outcome.break_inserted {
            breaks += 1;
            println!(
                "{}  {}",
                clock(record.ts_ms),
                "restart break inserted".red().bold()
            );
        }
        if outcome.stage != last_stage {
            println!(
                "{}  warmup {} -> {}",
                clock(record.ts_ms),
                last_stage.to_string().as_str().dimmed(),
                outcome.stage.to_string().as_str().yellow()
            );
            last_stage = outcome.stage;
        }
        print_poll(record.ts_ms, &outcome, args.interventions_only);
    }

    println!();
    println!(
        "{} polls, {} points plotted, {} restart breaks",
        records.len(),
        pipeline.len(),
        breaks
    );
    let tally = DECISION_NAMES
        .iter()
        .zip(totals)
        .map(|(name, count)| format!("{name} {count}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{tally}");
    Ok(())
}

fn print_poll(ts_ms: i64, outcome: &IngestOutcome, interventions_only: bool) {
    let mut cells = Vec::new();
    for ch in Channel::ALL {
        if let Some(decision) = outcome.verdicts[ch.index()] {
            if !interventions_only || is_intervention(decision) {
                cells.push(format!("{ch} {}", paint(decision)));
            }
        }
    }
    if cells.is_empty() {
        return;
    }
    println!("{}  {}", clock(ts_ms), cells.join("  "));
}
