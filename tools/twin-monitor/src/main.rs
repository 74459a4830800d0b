use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio::sync::Notify;
use tracing::{info, Level};
use twin_telemetry::{
    AlertLevel, DeliveryMode, SignalValue, SimulationScheduler, SimulatorConfig, Snapshot,
    ThresholdTable,
};

#[derive(Parser)]
#[command(name = "twin-monitor")]
#[command(about = "Console monitor for the panel-shop digital twin telemetry")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation and print every snapshot
    Run {
        /// Simulator configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Threshold table file (TOML), overrides the configuration
        #[arg(short, long)]
        thresholds: Option<PathBuf>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Tick period in milliseconds
        #[arg(short, long)]
        period_ms: Option<u64>,

        /// Stop after this many ticks; runs until Ctrl+C otherwise
        #[arg(short = 'n', long)]
        ticks: Option<u64>,

        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,

        /// Deliver on the scheduler task instead of a dedicated worker
        #[arg(long)]
        inline: bool,

        /// Only print tags that are not OK
        #[arg(long)]
        alerts_only: bool,
    },

    /// Classify a single reading against the threshold table
    Classify {
        /// Signal tag
        #[arg(required = true)]
        tag: String,

        /// Reading: a number, `true`/`false`, or omitted for a missing value
        value: Option<String>,

        /// Threshold table file (TOML); built-in panel table otherwise
        #[arg(short, long)]
        thresholds: Option<PathBuf>,
    },

    /// Print the threshold table as TOML
    Thresholds {
        /// Threshold table file (TOML); built-in panel table otherwise
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write the default simulator configuration to a file
    InitConfig {
        #[arg(required = true)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Run { config, thresholds, seed, period_ms, ticks, json, inline, alerts_only } => {
            let mut config = match config {
                Some(path) => SimulatorConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SimulatorConfig::default(),
            };
            if thresholds.is_some() {
                config.thresholds_path = thresholds;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(period_ms) = period_ms {
                config.tick_period_ms = period_ms;
            }
            if inline {
                config.delivery = DeliveryMode::Inline;
            }
            run(config, ticks, json, alerts_only).await
        }
        Commands::Classify { tag, value, thresholds } => {
            let table = load_table(thresholds.as_ref())?;
            let value = value.as_deref().map(parse_value).transpose()?;
            let level = table.classify(&tag, value);
            println!("{} {} -> {}", tag.bold(), format_value(value), paint(level));
            Ok(())
        }
        Commands::Thresholds { file } => {
            let table = load_table(file.as_ref())?;
            print!("{}", table.to_toml_string()?);
            Ok(())
        }
        Commands::InitConfig { path } => {
            SimulatorConfig::default().to_file(&path)?;
            println!("{}", format!("Wrote default configuration to {}", path.display()).green());
            Ok(())
        }
    }
}

async fn run(config: SimulatorConfig, ticks: Option<u64>, json: bool, alerts_only: bool) -> Result<()> {
    let scheduler = SimulationScheduler::new(config)?;
    let done = Arc::new(Notify::new());
    let seen = Arc::new(AtomicU64::new(0));

    {
        let done = done.clone();
        let seen = seen.clone();
        scheduler.subscribe(move |snapshot| {
            if json {
                println!("{}", serde_json::to_string(snapshot.as_ref())?);
            } else {
                print_snapshot(&snapshot, alerts_only);
            }
            let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if ticks.is_some_and(|limit| count >= limit) {
                done.notify_one();
            }
            Ok(())
        });
    }

    info!(
        "Monitoring {} tags every {:?}",
        scheduler.thresholds().len(),
        scheduler.config().tick_period()
    );
    scheduler.start().await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for Ctrl+C")?;
            info!("Ctrl+C received, stopping");
        }
        _ = done.notified() => {}
    }
    scheduler.stop().await;

    let metrics = scheduler.get_metrics();
    info!(
        "Ran {} ticks: {} deliveries, {} dropped, {} subscriber faults, {} overruns",
        metrics.total_ticks,
        metrics.total_deliveries,
        metrics.dropped_deliveries,
        metrics.subscriber_faults,
        metrics.overruns
    );
    Ok(())
}

fn load_table(path: Option<&PathBuf>) -> Result<ThresholdTable> {
    match path {
        Some(path) => ThresholdTable::from_file(path)
            .with_context(|| format!("loading thresholds from {}", path.display())),
        None => Ok(ThresholdTable::panel_default()),
    }
}

fn parse_value(raw: &str) -> Result<SignalValue> {
    match raw {
        "true" => Ok(SignalValue::Binary(true)),
        "false" => Ok(SignalValue::Binary(false)),
        _ => {
            let value: f64 = raw.parse().with_context(|| format!("invalid reading {raw:?}"))?;
            Ok(SignalValue::Numeric(value))
        }
    }
}

fn format_value(value: Option<SignalValue>) -> String {
    match value {
        Some(SignalValue::Numeric(v)) => format!("{v:.2}"),
        Some(SignalValue::Binary(b)) => b.to_string(),
        None => "-".to_string(),
    }
}

fn paint(level: AlertLevel) -> ColoredString {
    match level {
        AlertLevel::Ok => level.as_str().green(),
        AlertLevel::Warn => level.as_str().yellow().bold(),
        AlertLevel::Alarm => level.as_str().red().bold(),
        AlertLevel::NoSignal => level.as_str().dimmed(),
    }
}

fn print_snapshot(snapshot: &Snapshot, alerts_only: bool) {
    let summary = snapshot.alert_summary();
    println!(
        "{} {} {}  ok {} warn {} alarm {} no-signal {}  OEE {:.1}%",
        format!("tick {:>5}", snapshot.tick).cyan().bold(),
        snapshot.generated_at.format("%H:%M:%S%.3f"),
        paint(summary.worst()),
        summary.ok,
        summary.warn,
        summary.alarm,
        summary.no_signal,
        snapshot.kpis.plant_oee
    );

    for (tag, level) in &snapshot.alerts {
        if alerts_only && *level == AlertLevel::Ok {
            continue;
        }
        let signal = snapshot.signal(tag);
        let trend = signal
            .filter(|s| matches!(s.value, SignalValue::Numeric(_)))
            .map(|s| format!("{:+.2}/min", s.trend))
            .unwrap_or_default();
        println!(
            "  {:<32} {:>10} {:>12}  {}",
            tag,
            format_value(signal.map(|s| s.value)),
            trend,
            paint(*level)
        );
    }
}
