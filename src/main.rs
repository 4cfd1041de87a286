//! PowerSpike Monitor - Main entry point
//!
//! Runs the forecast scheduler in the background and classifies readings
//! streamed on stdin (one JSON object per line), answering each with a JSON
//! line on stdout. Logs go to stderr.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use powerspike_monitor_lib::core::Config;
use powerspike_monitor_lib::db::Database;
use powerspike_monitor_lib::detector::SpikeDetector;
use powerspike_monitor_lib::forecast::{dataset, FileModelRepository, ForecastStore};
use powerspike_monitor_lib::ingest::{IngestRequest, IngestService};
use powerspike_monitor_lib::scheduler::{tick_period, CycleOutcome, RetrainScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "powerspike-monitor", version, about = "Appliance power forecasting and spike detection")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "POWERSPIKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and classify readings from stdin (default)
    Run,
    /// Run one retraining cycle and exit
    Retrain,
    /// Train from a historical CSV export and publish the first forecast
    Bootstrap {
        /// CSV file with a `time` column and one power column per appliance
        #[arg(long)]
        csv: PathBuf,
        /// Power column to train on (defaults to the configured appliance id)
        #[arg(long)]
        column: Option<String>,
    },
    /// Print the calibration offset
    GetOffset,
    /// Set the calibration offset in watts
    SetOffset {
        #[arg(allow_negative_numbers = true)]
        watts: f64,
    },
    /// Print the most recent alerts
    Alerts {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    log::info!("Starting PowerSpike Monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    let db = Database::new(&config).context("Failed to initialize database")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, db).await,
        Command::Retrain => {
            let (scheduler, _, db) = build_scheduler(&config, db)?;
            let outcome = tokio::task::spawn_blocking(move || {
                let mut scheduler = scheduler;
                scheduler.retrain(&db, Utc::now())
            })
            .await??;
            report(&outcome);
            Ok(())
        }
        Command::Bootstrap { csv, column } => {
            let appliance_id = config.general.appliance_id.clone();
            let column = column.unwrap_or_else(|| appliance_id.clone());
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("Failed to open dataset {}", csv.display()))?;
            let readings = dataset::read_csv(file, &appliance_id, &column)
                .with_context(|| format!("Failed to read dataset {}", csv.display()))?;

            let (scheduler, _, db) = build_scheduler(&config, db)?;
            let outcome = tokio::task::spawn_blocking(move || {
                let mut scheduler = scheduler;
                scheduler.bootstrap(&db, &readings, Utc::now())
            })
            .await??;
            report(&outcome);
            Ok(())
        }
        Command::GetOffset => {
            let offset = db.get_offset()?;
            println!("{} W (version {})", offset.watts, offset.version);
            Ok(())
        }
        Command::SetOffset { watts } => {
            let offset = db.set_offset(watts)?;
            log::info!("Offset set to {} W (version {})", offset.watts, offset.version);
            println!("{} W (version {})", offset.watts, offset.version);
            Ok(())
        }
        Command::Alerts { limit } => {
            for alert in db.recent_alerts(limit)? {
                println!(
                    "{}  {:<12} {:>9.2} W  threshold {:>9.2} W  {}",
                    alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    alert.appliance_id,
                    alert.power_watts,
                    alert.threshold,
                    alert.message
                );
            }
            Ok(())
        }
    }
}

/// Scheduler, published forecast and the database handle shared with ingest
fn build_scheduler(
    config: &Config,
    db: Database,
) -> anyhow::Result<(RetrainScheduler, Arc<ForecastStore>, Arc<Mutex<Database>>)> {
    let forecasts = Arc::new(ForecastStore::new(db.load_active_forecasts()?));
    let snapshot = forecasts.snapshot();
    match snapshot.span() {
        Some((first, last)) => log::info!(
            "Loaded forecast generation {} covering {} to {}",
            snapshot.generation(),
            first,
            last
        ),
        None => log::info!("No forecast published yet (cold start)"),
    }

    let repository = Arc::new(FileModelRepository::new(config.data_dir()?.join("models"))?);
    let mut scheduler = RetrainScheduler::new(config, repository, Arc::clone(&forecasts));
    if let Err(e) = scheduler.restore() {
        log::warn!("Could not restore saved model: {}", e);
    }

    Ok((scheduler, forecasts, Arc::new(Mutex::new(db))))
}

async fn run(config: Config, db: Database) -> anyhow::Result<()> {
    let (scheduler, forecasts, db) = build_scheduler(&config, db)?;
    tokio::spawn(scheduler_loop(config, scheduler, Arc::clone(&db)));

    let service = IngestService::new(db, SpikeDetector::new(forecasts));
    ingest_loop(service).await
}

/// Background task that runs due scheduler cycles on the blocking pool
async fn scheduler_loop(config: Config, mut scheduler: RetrainScheduler, db: Arc<Mutex<Database>>) {
    let period = tick_period(&config.schedule);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    log::info!("Scheduler loop started with {}s period", period.as_secs());

    loop {
        interval.tick().await;

        let cycle_db = Arc::clone(&db);
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = scheduler.run_due(&cycle_db, Utc::now());
            (scheduler, outcome)
        })
        .await;

        let outcome = match joined {
            Ok((returned, outcome)) => {
                scheduler = returned;
                outcome
            }
            Err(e) => {
                log::error!("Scheduler task aborted, stopping scheduler: {}", e);
                return;
            }
        };

        match outcome {
            Ok(outcome) => {
                report(&outcome);
                if matches!(outcome, CycleOutcome::Retrained { .. }) {
                    let db = db.lock().await;
                    match db.cleanup_old_readings(config.training.history_days, Utc::now()) {
                        Ok(0) => {}
                        Ok(n) => log::info!("Removed {} readings older than the history window", n),
                        Err(e) => log::warn!("Failed to clean up old readings: {}", e),
                    }
                }
            }
            Err(e) => log::error!("Scheduler cycle failed, keeping previous forecast: {}", e),
        }
    }
}

fn report(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Retrained { samples, generation, handle } => log::info!(
            "Retrained on {} samples, model '{}', forecast generation {}",
            samples,
            handle,
            generation
        ),
        CycleOutcome::Regenerated { generation } => {
            log::info!("Regenerated forecast generation {}", generation)
        }
        CycleOutcome::Skipped { reason } => log::warn!("Cycle skipped: {}", reason),
    }
}

/// Read JSON readings from stdin until it closes
async fn ingest_loop(service: IngestService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    log::info!("Waiting for readings on stdin");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IngestRequest>(line) {
            Ok(request) => match service.ingest(request, Utc::now()).await {
                Ok(response) => serde_json::to_value(response)?,
                Err(e) => {
                    log::warn!("Rejected reading: {}", e);
                    serde_json::json!({ "status": "error", "message": e.to_string() })
                }
            },
            Err(e) => serde_json::json!({ "status": "error", "message": format!("Invalid request: {}", e) }),
        };

        stdout.write_all(format!("{}\n", response).as_bytes()).await?;
        stdout.flush().await?;
    }

    log::info!("Input closed, shutting down");
    Ok(())
}
