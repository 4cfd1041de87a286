//! PowerSpike Monitor - Demo CLI
//!
//! Seeds a day of synthetic laptop readings into an in-memory database,
//! trains a baseline, publishes the next hour of forecasts and classifies a
//! few live readings against it.

use chrono::{Duration, Utc};
use powerspike_monitor_lib::core::{Config, Reading};
use powerspike_monitor_lib::db::Database;
use powerspike_monitor_lib::detector::SpikeDetector;
use powerspike_monitor_lib::forecast::{ForecastStore, MemoryModelRepository};
use powerspike_monitor_lib::scheduler::{CycleOutcome, RetrainScheduler};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;

const APPLIANCE: &str = "laptop";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("==============================================");
    println!("   PowerSpike Monitor - Demo");
    println!("==============================================\n");

    let now = Utc::now();

    // 1. Database
    println!("[1/4] Opening in-memory database...");
    let db = Database::open_in_memory()?;
    println!();

    // 2. Synthetic history: one reading per minute for the last 24 hours,
    //    30-70 W with a 5% chance of a 100-160 W spike
    println!("[2/4] Seeding synthetic readings...");
    let mut rng = rand::thread_rng();
    let start = now - Duration::days(1);
    for i in 0..1440 {
        let power = if rng.gen_bool(0.05) {
            rng.gen_range(100.0..160.0)
        } else {
            rng.gen_range(30.0..70.0)
        };
        let power = (power * 100.0_f64).round() / 100.0;
        db.insert_reading(&Reading::new(APPLIANCE, power, start + Duration::minutes(i)))?;
    }
    println!("      Inserted {} readings for '{}'\n", db.get_readings_count()?, APPLIANCE);

    // 3. Train and publish
    println!("[3/4] Training baseline and generating forecast...");
    let config = Config::default();
    let forecasts = Arc::new(ForecastStore::default());
    let mut scheduler = RetrainScheduler::new(
        &config,
        Arc::new(MemoryModelRepository::new()),
        Arc::clone(&forecasts),
    );
    let db = Mutex::new(db);

    match scheduler.retrain(&db, now)? {
        CycleOutcome::Retrained { samples, generation, .. } => {
            println!("      Trained on {} minutes, forecast generation {}", samples, generation)
        }
        other => {
            println!("      Training did not run: {:?}", other);
            return Ok(());
        }
    }

    println!();
    println!("----------------------------------------------");
    println!("  Minute            | Expected | Threshold");
    println!("----------------------------------------------");
    for point in forecasts.snapshot().points().take(5) {
        println!(
            "  {} | {:>6.1} W | {:>7.1} W",
            point.minute_bucket, point.expected_power, point.spike_threshold
        );
    }
    println!("  ...");
    println!("----------------------------------------------\n");

    // 4. Live readings
    println!("[4/4] Classifying live readings...\n");
    let detector = SpikeDetector::new(Arc::clone(&forecasts));
    let offset = db.blocking_lock().get_offset()?;

    let expected = forecasts
        .snapshot()
        .points()
        .next()
        .map(|p| p.expected_power)
        .unwrap_or(50.0);

    let samples = [
        ("typical draw", Reading::new(APPLIANCE, expected, now)),
        ("heavy load", Reading::new(APPLIANCE, expected * 3.0, now + Duration::minutes(10))),
        ("two hours out", Reading::new(APPLIANCE, expected * 3.0, now + Duration::hours(2))),
    ];

    for (label, reading) in &samples {
        let eval = detector.evaluate(reading, offset.watts);
        println!(
            "  {:<14} {:>7.1} W  -> {:?}: {}",
            label, reading.power_watts, eval.status, eval.message
        );
        if let Some(alert) = &eval.alert {
            db.blocking_lock().insert_alert(alert)?;
        }
    }

    println!("\n  Alerts stored: {}", db.blocking_lock().recent_alerts(100)?.len());
    println!("\n==============================================\n");

    Ok(())
}
