//! Forecast generation for the upcoming hour

use crate::core::{ForecastPoint, MinuteBucket, Result};
use crate::forecast::features::features;
use crate::forecast::model::BaselineModel;
use chrono::{DateTime, Utc};

/// Minutes covered by one forecast set
pub const FORECAST_HORIZON_MINUTES: usize = 60;

/// Spike threshold as a multiple of expected power (50% headroom)
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 1.5;

/// Projects a model onto the next hour of minute buckets
#[derive(Debug, Clone, Copy)]
pub struct ForecastGenerator {
    threshold_factor: f64,
}

impl ForecastGenerator {
    pub fn new(threshold_factor: f64) -> Self {
        Self { threshold_factor }
    }

    pub fn threshold_factor(&self) -> f64 {
        self.threshold_factor
    }

    /// One point per minute starting at the minute containing `from`.
    ///
    /// Always returns [`FORECAST_HORIZON_MINUTES`] contiguous points.
    /// Negative model output is floored at zero draw.
    pub fn generate(&self, model: &BaselineModel, from: DateTime<Utc>) -> Result<Vec<ForecastPoint>> {
        let start = MinuteBucket::containing(from);
        let buckets: Vec<MinuteBucket> = (0..FORECAST_HORIZON_MINUTES as i64)
            .map(|i| start.offset_minutes(i))
            .collect();
        let inputs: Vec<_> = buckets.iter().map(|b| features(&b.start())).collect();

        let points = buckets
            .into_iter()
            .zip(model.predict_many(&inputs)?)
            .map(|(minute_bucket, predicted)| {
                let expected_power = predicted.max(0.0);
                ForecastPoint {
                    minute_bucket,
                    expected_power,
                    spike_threshold: expected_power * self.threshold_factor,
                }
            })
            .collect();
        Ok(points)
    }
}

impl Default for ForecastGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_FACTOR)
    }
}
