//! Baseline trainer
//!
//! Fits a fresh [`BaselineModel`] over the whole provided history. Sparse
//! history is expected during cold start, so too few samples yields
//! [`Error::InsufficientData`] and the caller keeps its previous model.

use crate::core::{Error, Reading, Result};
use crate::forecast::baseline::{baseline_samples, BaselineSample, MinuteSeries, DEFAULT_WINDOW_SIZE};
use crate::forecast::model::BaselineModel;
use chrono::{DateTime, Utc};

/// Default minimum number of samples needed to train
pub const DEFAULT_MIN_SAMPLES: usize = 100;

/// Trains baseline models for one appliance
#[derive(Debug, Clone)]
pub struct BaselineTrainer {
    appliance_id: String,
    window_size: usize,
    min_samples: usize,
}

impl BaselineTrainer {
    /// Create a trainer with the default window and minimum sample count
    pub fn new(appliance_id: &str) -> Self {
        Self {
            appliance_id: appliance_id.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }

    /// Override the moving-average window
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Override the minimum sample count
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn appliance_id(&self) -> &str {
        &self.appliance_id
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Fit a model on prepared baseline samples
    pub fn train(&self, samples: &[BaselineSample], now: DateTime<Utc>) -> Result<BaselineModel> {
        self.require(samples.len())?;

        log::info!(
            "Training baseline model for '{}' on {} minutes of data",
            self.appliance_id,
            samples.len()
        );
        BaselineModel::fit(&self.appliance_id, samples, now)
    }

    /// Resample, smooth and fit raw readings.
    ///
    /// The raw reading count is checked before resampling: zero-filled gaps
    /// could otherwise turn a handful of readings spread over weeks into
    /// thousands of samples.
    pub fn train_on_readings(&self, readings: &[Reading], now: DateTime<Utc>) -> Result<BaselineModel> {
        self.require(readings.len())?;

        let series = MinuteSeries::resample(readings).ok_or(Error::InsufficientData {
            available: 0,
            required: self.min_samples,
        })?;
        let samples = baseline_samples(&series, self.window_size);

        log::debug!(
            "Resampled {} readings into {} minutes, {} baseline samples",
            readings.len(),
            series.len(),
            samples.len()
        );
        self.train(&samples, now)
    }

    fn require(&self, available: usize) -> Result<()> {
        if available == 0 || available < self.min_samples {
            return Err(Error::InsufficientData {
                available,
                required: self.min_samples,
            });
        }
        Ok(())
    }
}
