//! End-to-end checks: readings in, forecast published, live readings classified

use chrono::{DateTime, Duration, TimeZone, Utc};
use powerspike_monitor_lib::core::{Config, ForecastPoint, MinuteBucket, Reading};
use powerspike_monitor_lib::db::Database;
use powerspike_monitor_lib::detector::{SpikeDetector, SpikeStatus};
use powerspike_monitor_lib::forecast::{
    dataset, BaselineTrainer, ForecastSet, ForecastStore, MemoryModelRepository, ModelRepository,
};
use powerspike_monitor_lib::ingest::{IngestRequest, IngestService};
use powerspike_monitor_lib::scheduler::{CycleOutcome, RetrainScheduler};
use std::sync::Arc;
use tokio::sync::Mutex;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// Twenty minutes at 50 W with a single 200 W minute at 12:10
fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    for i in 0..20 {
        let power = if i == 10 { 200.0 } else { 50.0 };
        db.insert_reading(&Reading::new("laptop", power, start() + Duration::minutes(i)))
            .unwrap();
    }
    db
}

fn scheduler(forecasts: &Arc<ForecastStore>, min_samples: usize) -> RetrainScheduler {
    RetrainScheduler::new(
        &Config::default(),
        Arc::new(MemoryModelRepository::new()),
        Arc::clone(forecasts),
    )
    .with_trainer(
        BaselineTrainer::new("laptop")
            .with_window_size(15)
            .with_min_samples(min_samples),
    )
}

#[test]
fn test_trained_baseline_classifies_live_readings() {
    let forecasts = Arc::new(ForecastStore::default());
    let db = Mutex::new(seeded_db());
    let now = start() + Duration::minutes(20);

    let outcome = scheduler(&forecasts, 1).retrain(&db, now).unwrap();
    assert!(matches!(outcome, CycleOutcome::Retrained { samples: 6, generation: 1, .. }));

    // Every full 15-minute window contains the 200 W minute: (14 * 50 + 200) / 15 = 60
    let snapshot = forecasts.snapshot();
    assert_eq!(snapshot.len(), 60);
    for point in snapshot.points() {
        assert!((point.expected_power - 60.0).abs() < 1e-9);
        assert!((point.spike_threshold - 90.0).abs() < 1e-9);
    }

    let detector = SpikeDetector::new(Arc::clone(&forecasts));
    let at = now + Duration::minutes(10);

    assert_eq!(detector.evaluate(&Reading::new("laptop", 91.0, at), 0.0).status, SpikeStatus::Spike);
    assert_eq!(detector.evaluate(&Reading::new("laptop", 90.0, at), 0.0).status, SpikeStatus::Normal);
    assert_eq!(detector.evaluate(&Reading::new("laptop", 60.0, at), 0.0).status, SpikeStatus::Normal);

    let past_horizon = now + Duration::minutes(60);
    assert_eq!(
        detector.evaluate(&Reading::new("laptop", 500.0, past_horizon), 0.0).status,
        SpikeStatus::Unknown
    );
}

#[test]
fn test_offset_pushes_reading_over_threshold() {
    let bucket = MinuteBucket::containing(start());
    let forecasts = Arc::new(ForecastStore::new(ForecastSet::new(
        1,
        start(),
        vec![ForecastPoint {
            minute_bucket: bucket,
            expected_power: 60.0,
            spike_threshold: 85.0,
        }],
    )));
    let detector = SpikeDetector::new(forecasts);
    let reading = Reading::new("laptop", 80.0, start() + Duration::seconds(20));

    assert_eq!(detector.evaluate(&reading, 0.0).status, SpikeStatus::Normal);

    let evaluation = detector.evaluate(&reading, 10.0);
    assert_eq!(evaluation.status, SpikeStatus::Spike);
    assert_eq!(evaluation.adjusted_power, 90.0);
    assert_eq!(evaluation.message, "SPIKE DETECTED! 90.00W > 85.00W");
}

#[test]
fn test_refused_retrain_keeps_previous_model_and_forecast() {
    let forecasts = Arc::new(ForecastStore::default());
    let repository = Arc::new(MemoryModelRepository::new());
    let db = Mutex::new(seeded_db());
    let now = start() + Duration::minutes(20);

    let mut scheduler = RetrainScheduler::new(&Config::default(), repository.clone(), Arc::clone(&forecasts))
        .with_trainer(BaselineTrainer::new("laptop").with_window_size(15).with_min_samples(10));

    assert!(matches!(scheduler.retrain(&db, now).unwrap(), CycleOutcome::Retrained { .. }));
    let handle = scheduler.model_handle().cloned().unwrap();
    let artifact = serde_json::to_vec(&repository.load(&handle).unwrap()).unwrap();
    let published = forecasts.snapshot();

    // The seeded readings have aged out of the 30 day history window
    let outcome = scheduler.retrain(&db, now + Duration::days(40)).unwrap();

    assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
    assert_eq!(scheduler.model_handle(), Some(&handle));
    assert_eq!(serde_json::to_vec(&repository.load(&handle).unwrap()).unwrap(), artifact);
    assert!(Arc::ptr_eq(&published, &forecasts.snapshot()));
    assert_eq!(db.blocking_lock().load_active_forecasts().unwrap(), *published);
}

#[tokio::test]
async fn test_ingest_through_published_forecast() {
    let forecasts = Arc::new(ForecastStore::default());
    let db = Arc::new(Mutex::new(seeded_db()));
    let now = start() + Duration::minutes(20);

    let mut scheduler = scheduler(&forecasts, 1);
    let cycle_db = Arc::clone(&db);
    let outcome = tokio::task::spawn_blocking(move || scheduler.retrain(&cycle_db, now))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Retrained { .. }));

    db.lock().await.set_offset(5.0).unwrap();
    let service = IngestService::new(Arc::clone(&db), SpikeDetector::new(forecasts));

    let request = |power: f64| IngestRequest {
        appliance_id: "laptop".to_string(),
        power,
        timestamp: Some(now + Duration::minutes(3)),
    };

    let normal = service.ingest(request(85.0), now).await.unwrap();
    assert!(!normal.spike_detected);
    assert_eq!(normal.classification, SpikeStatus::Normal);

    let spike = service.ingest(request(86.0), now).await.unwrap();
    assert!(spike.spike_detected);
    assert_eq!(spike.message, "SPIKE DETECTED! 91.00W > 90.00W");

    let db = db.lock().await;
    assert_eq!(db.recent_alerts(10).unwrap().len(), 1);
    assert_eq!(db.get_readings_count().unwrap(), 22);
}

#[test]
fn test_bootstrap_from_exported_log_leaves_cold_start() {
    let mut csv = String::from("time,aggregate,laptop\n");
    let exported = Utc.with_ymd_and_hms(2013, 6, 3, 8, 0, 0).unwrap();
    for i in 0..200 {
        let ts = exported + Duration::minutes(i);
        csv.push_str(&format!("{},400,{}\n", ts.format("%Y-%m-%d %H:%M:%S"), if i % 2 == 0 { 40 } else { 50 }));
    }
    let readings = dataset::read_csv(csv.as_bytes(), "laptop", "laptop").unwrap();
    assert_eq!(readings.len(), 200);

    let forecasts = Arc::new(ForecastStore::default());
    let db = Mutex::new(Database::open_in_memory().unwrap());
    let detector = SpikeDetector::new(Arc::clone(&forecasts));
    let now = start();
    let live = Reading::new("laptop", 500.0, now + Duration::minutes(5));

    assert_eq!(detector.evaluate(&live, 0.0).status, SpikeStatus::Unknown);

    let mut scheduler = RetrainScheduler::new(
        &Config::default(),
        Arc::new(MemoryModelRepository::new()),
        Arc::clone(&forecasts),
    );
    let outcome = scheduler.bootstrap(&db, &readings, now).unwrap();

    assert!(matches!(outcome, CycleOutcome::Retrained { samples: 186, .. }));
    assert_eq!(db.blocking_lock().load_active_forecasts().unwrap().len(), 60);
    assert_eq!(detector.evaluate(&live, 0.0).status, SpikeStatus::Spike);
}
