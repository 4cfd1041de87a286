//! Retraining scheduler
//!
//! Two kinds of cycle:
//! - retrain: fetch the rolling history window, fit a new model, save it and
//!   publish a fresh forecast (daily by default)
//! - regenerate: reload the saved model and publish a forecast for the next
//!   hour (hourly by default)
//!
//! Cycles are plain blocking calls; the daemon runs them on the blocking pool.
//! The database lock is held only while reading history and while publishing,
//! never during training.

use crate::core::{Config, Reading, Result, ScheduleConfig};
use crate::db::Database;
use crate::forecast::{
    BaselineModel, BaselineTrainer, ForecastGenerator, ForecastSet, ForecastStore, ModelHandle, ModelRepository,
    FORECAST_HORIZON_MINUTES,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What a cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// New model trained and a forecast published from it
    Retrained {
        samples: usize,
        generation: u64,
        handle: ModelHandle,
    },
    /// Forecast re-published from the existing model
    Regenerated { generation: u64 },
    /// Nothing changed; previous model and forecast remain in effect
    Skipped { reason: String },
}

/// Slack kept between a tick and the end of the published horizon. A set
/// published at `t` ends at the start of the minute containing `t` plus the
/// horizon, so up to a minute is lost to truncation, and the cycle itself
/// takes time.
const HORIZON_MARGIN_SECS: u64 = 120;

/// Scheduler tick period: the configured regeneration interval, shortened
/// when needed so the next set is published before the current one runs out
pub fn tick_period(schedule: &ScheduleConfig) -> std::time::Duration {
    let horizon = FORECAST_HORIZON_MINUTES as u64 * 60;
    let limit = horizon - HORIZON_MARGIN_SECS;
    let secs = schedule.regenerate_interval_secs;

    if secs > limit {
        log::info!(
            "Regeneration interval {}s would outlive the {}s forecast horizon, ticking every {}s",
            secs,
            horizon,
            limit
        );
    }
    std::time::Duration::from_secs(secs.min(limit))
}

/// Drives retraining and forecast regeneration for one appliance
pub struct RetrainScheduler {
    trainer: BaselineTrainer,
    generator: ForecastGenerator,
    history_days: u32,
    retrain_interval: Duration,
    repository: Arc<dyn ModelRepository + Send + Sync>,
    forecasts: Arc<ForecastStore>,
    model: Option<ModelHandle>,
    last_trained: Option<DateTime<Utc>>,
}

impl RetrainScheduler {
    pub fn new(
        config: &Config,
        repository: Arc<dyn ModelRepository + Send + Sync>,
        forecasts: Arc<ForecastStore>,
    ) -> Self {
        let trainer = BaselineTrainer::new(&config.general.appliance_id)
            .with_window_size(config.training.window_size)
            .with_min_samples(config.training.min_samples);

        log::info!(
            "Scheduler for '{}': retrain every {}s, regenerate every {}s, {} day history",
            config.general.appliance_id,
            config.schedule.retrain_interval_secs,
            config.schedule.regenerate_interval_secs,
            config.training.history_days
        );

        Self {
            trainer,
            generator: ForecastGenerator::new(config.forecast.threshold_factor),
            history_days: config.training.history_days,
            retrain_interval: Duration::seconds(config.schedule.retrain_interval_secs as i64),
            repository,
            forecasts,
            model: None,
            last_trained: None,
        }
    }

    /// Replace the trainer (custom window or minimum sample count)
    pub fn with_trainer(mut self, trainer: BaselineTrainer) -> Self {
        self.trainer = trainer;
        self
    }

    /// Handle of the model currently in use
    pub fn model_handle(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    pub fn last_trained(&self) -> Option<DateTime<Utc>> {
        self.last_trained
    }

    /// Pick up a model saved by an earlier run. Returns whether one was found.
    pub fn restore(&mut self) -> Result<bool> {
        let Some(handle) = self.repository.latest(self.trainer.appliance_id())? else {
            return Ok(false);
        };

        let model = self.repository.load(&handle)?;
        log::info!(
            "Restored model '{}' trained at {} on {} samples",
            handle,
            model.trained_at(),
            model.sample_count()
        );
        self.last_trained = Some(model.trained_at());
        self.model = Some(handle);
        Ok(true)
    }

    /// Retrain if no model exists or the retrain interval elapsed, otherwise regenerate
    pub fn run_due(&mut self, db: &Mutex<Database>, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let retrain_due = match (&self.model, self.last_trained) {
            (Some(_), Some(last)) => now - last >= self.retrain_interval,
            _ => true,
        };

        if !retrain_due {
            return self.regenerate(db, now);
        }

        match self.retrain(db, now)? {
            CycleOutcome::Skipped { reason } if self.model.is_some() => {
                log::warn!("Keeping current model ({}), regenerating its forecast", reason);
                self.regenerate(db, now)
            }
            outcome => Ok(outcome),
        }
    }

    /// Fit a new model on the rolling history window and publish its forecast
    pub fn retrain(&mut self, db: &Mutex<Database>, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let since = now - Duration::days(i64::from(self.history_days));
        let readings = {
            let db = db.blocking_lock();
            db.get_readings(self.trainer.appliance_id(), since, now)?
        };
        log::info!("Fetched {} readings since {}", readings.len(), since);

        self.train_and_publish(db, &readings, now)
    }

    /// Train on a historical dataset instead of the stored history.
    ///
    /// Used to leave cold start before enough live readings have arrived.
    /// Refusal rules are the same as for [`retrain`](Self::retrain).
    pub fn bootstrap(&mut self, db: &Mutex<Database>, readings: &[Reading], now: DateTime<Utc>) -> Result<CycleOutcome> {
        match (readings.first(), readings.last()) {
            (Some(first), Some(last)) => log::info!(
                "Bootstrapping from {} historical readings ({} to {})",
                readings.len(),
                first.timestamp,
                last.timestamp
            ),
            _ => log::info!("Bootstrapping from an empty dataset"),
        }
        self.train_and_publish(db, readings, now)
    }

    fn train_and_publish(&mut self, db: &Mutex<Database>, readings: &[Reading], now: DateTime<Utc>) -> Result<CycleOutcome> {
        let model = match self.trainer.train_on_readings(readings, now) {
            Ok(model) => model,
            Err(e) if e.is_recoverable() => {
                log::warn!("Not enough data to retrain, skipping: {}", e);
                return Ok(CycleOutcome::Skipped { reason: e.to_string() });
            }
            Err(e) => return Err(e),
        };

        let handle = self.repository.save(&model)?;
        let set = self.publish(db, &model, now)?;

        self.model = Some(handle.clone());
        self.last_trained = Some(now);

        Ok(CycleOutcome::Retrained {
            samples: model.sample_count(),
            generation: set.generation(),
            handle,
        })
    }

    /// Publish a forecast for the coming hour from the saved model
    pub fn regenerate(&mut self, db: &Mutex<Database>, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let Some(handle) = &self.model else {
            log::warn!("No trained model yet, skipping forecast regeneration");
            return Ok(CycleOutcome::Skipped {
                reason: "no trained model".to_string(),
            });
        };

        let model = self.repository.load(handle)?;
        let set = self.publish(db, &model, now)?;
        Ok(CycleOutcome::Regenerated {
            generation: set.generation(),
        })
    }

    fn publish(&self, db: &Mutex<Database>, model: &BaselineModel, now: DateTime<Utc>) -> Result<ForecastSet> {
        let points = self.generator.generate(model, now)?;
        let set = {
            let db = db.blocking_lock();
            db.replace_forecasts(&points, now)?
        };

        if let Some((first, last)) = set.span() {
            log::info!(
                "Published forecast generation {} ({} points, {} to {})",
                set.generation(),
                set.len(),
                first,
                last
            );
        }
        self.forecasts.publish(set.clone());
        Ok(set)
    }
}
