//! Real-time spike detection
//!
//! Classifies a live reading against the forecast bucket for its minute.
//! Lookups go through a [`ForecastStore`] snapshot, so detection never waits
//! on retraining and gives the same answer for the same reading until the
//! next publication.

use crate::core::{Alert, Reading};
use crate::forecast::ForecastStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const COLD_START_MESSAGE: &str = "No forecast found for this time (Cold Start)";

/// Outcome of evaluating one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeStatus {
    /// At or below the threshold
    Normal,
    /// Strictly above the threshold
    Spike,
    /// No forecast covers this minute (cold start or stale forecasts)
    Unknown,
}

/// Classification of a reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: SpikeStatus,
    /// Reading power with the calibration offset applied
    pub adjusted_power: f64,
    /// Threshold of the matched bucket
    pub threshold: Option<f64>,
    pub message: String,
    /// Present only for spikes
    pub alert: Option<Alert>,
}

impl Evaluation {
    pub fn is_spike(&self) -> bool {
        self.status == SpikeStatus::Spike
    }
}

/// Compares readings with the published forecast
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    forecasts: Arc<ForecastStore>,
}

impl SpikeDetector {
    pub fn new(forecasts: Arc<ForecastStore>) -> Self {
        Self { forecasts }
    }

    /// Classify `reading` after adding `offset` watts to its power
    pub fn evaluate(&self, reading: &Reading, offset: f64) -> Evaluation {
        let adjusted_power = reading.power_watts + offset;
        let bucket = reading.bucket();

        let Some(point) = self.forecasts.lookup(&bucket) else {
            log::debug!("No forecast bucket for {} ({})", bucket, reading.appliance_id);
            return Evaluation {
                status: SpikeStatus::Unknown,
                adjusted_power,
                threshold: None,
                message: COLD_START_MESSAGE.to_string(),
                alert: None,
            };
        };

        let threshold = point.spike_threshold;
        if adjusted_power > threshold {
            let message = format!("SPIKE DETECTED! {:.2}W > {:.2}W", adjusted_power, threshold);
            log::warn!("{} [{} at {}]", message, reading.appliance_id, bucket);

            let alert = Alert {
                timestamp: reading.timestamp,
                appliance_id: reading.appliance_id.clone(),
                power_watts: adjusted_power,
                threshold,
                message: message.clone(),
            };
            Evaluation {
                status: SpikeStatus::Spike,
                adjusted_power,
                threshold: Some(threshold),
                message,
                alert: Some(alert),
            }
        } else {
            Evaluation {
                status: SpikeStatus::Normal,
                adjusted_power,
                threshold: Some(threshold),
                message: "Normal".to_string(),
                alert: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ForecastPoint, MinuteBucket};
    use crate::forecast::ForecastSet;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn detector_with_threshold(threshold: f64) -> (SpikeDetector, Arc<ForecastStore>) {
        let start = MinuteBucket::containing(base());
        let points = (0..60)
            .map(|i| ForecastPoint {
                minute_bucket: start.offset_minutes(i),
                expected_power: threshold / 1.5,
                spike_threshold: threshold,
            })
            .collect();
        let store = Arc::new(ForecastStore::new(ForecastSet::new(1, base(), points)));
        (SpikeDetector::new(Arc::clone(&store)), store)
    }

    #[test]
    fn test_equal_to_threshold_is_normal() {
        let (detector, _) = detector_with_threshold(90.0);
        let eval = detector.evaluate(&Reading::new("laptop", 90.0, base() + Duration::seconds(20)), 0.0);

        assert_eq!(eval.status, SpikeStatus::Normal);
        assert_eq!(eval.message, "Normal");
        assert!(eval.alert.is_none());
    }

    #[test]
    fn test_above_threshold_raises_alert() {
        let (detector, _) = detector_with_threshold(90.0);
        let reading = Reading::new("laptop", 90.5, base() + Duration::minutes(5) + Duration::seconds(59));
        let eval = detector.evaluate(&reading, 0.0);

        assert!(eval.is_spike());
        let alert = eval.alert.unwrap();
        assert_eq!(alert.timestamp, reading.timestamp);
        assert_eq!(alert.appliance_id, "laptop");
        assert_eq!(alert.power_watts, 90.5);
        assert_eq!(alert.threshold, 90.0);
        assert_eq!(alert.message, "SPIKE DETECTED! 90.50W > 90.00W");
    }

    #[test]
    fn test_offset_is_applied_before_comparison() {
        let (detector, _) = detector_with_threshold(85.0);
        let reading = Reading::new("laptop", 80.0, base());

        let eval = detector.evaluate(&reading, 10.0);
        assert!(eval.is_spike());
        assert_eq!(eval.adjusted_power, 90.0);
        assert_eq!(eval.alert.map(|a| a.power_watts), Some(90.0));

        assert_eq!(detector.evaluate(&reading, 0.0).status, SpikeStatus::Normal);
    }

    #[test]
    fn test_cold_start_is_unknown() {
        let detector = SpikeDetector::new(Arc::new(ForecastStore::default()));
        let eval = detector.evaluate(&Reading::new("laptop", 5000.0, base()), 0.0);

        assert_eq!(eval.status, SpikeStatus::Unknown);
        assert_eq!(eval.threshold, None);
        assert!(eval.alert.is_none());
        assert!(eval.message.contains("Cold Start"));
    }

    #[test]
    fn test_reading_outside_forecast_window_is_unknown() {
        let (detector, _) = detector_with_threshold(90.0);

        let late = detector.evaluate(&Reading::new("laptop", 500.0, base() + Duration::minutes(60)), 0.0);
        let early = detector.evaluate(&Reading::new("laptop", 500.0, base() - Duration::seconds(1)), 0.0);

        assert_eq!(late.status, SpikeStatus::Unknown);
        assert_eq!(early.status, SpikeStatus::Unknown);
    }

    #[test]
    fn test_repeat_evaluation_is_stable() {
        let (detector, _) = detector_with_threshold(90.0);
        let reading = Reading::new("laptop", 120.0, base() + Duration::minutes(12));

        assert_eq!(detector.evaluate(&reading, 0.0), detector.evaluate(&reading, 0.0));
    }

    #[test]
    fn test_follows_republished_forecast() {
        let (detector, store) = detector_with_threshold(90.0);
        let reading = Reading::new("laptop", 100.0, base());
        assert!(detector.evaluate(&reading, 0.0).is_spike());

        let start = MinuteBucket::containing(base());
        store.publish(ForecastSet::new(
            2,
            base(),
            vec![ForecastPoint { minute_bucket: start, expected_power: 100.0, spike_threshold: 150.0 }],
        ));
        assert_eq!(detector.evaluate(&reading, 0.0).status, SpikeStatus::Normal);
    }
}
