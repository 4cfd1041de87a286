//! Baseline target construction
//!
//! Raw readings are resampled onto a gapless one-minute grid and smoothed with
//! a trailing moving average. The smoothed value is what the regressor learns,
//! so it picks up the daily/weekly trend instead of second-to-second noise.
//!
//! Minutes without any reading count as zero draw. An outage therefore pulls
//! the baseline down rather than being skipped.

use crate::core::{MinuteBucket, Reading};
use crate::forecast::features::{features, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default moving-average window (15 minutes)
pub const DEFAULT_WINDOW_SIZE: usize = 15;

/// Power series on a uniform one-minute grid
#[derive(Debug, Clone, PartialEq)]
pub struct MinuteSeries {
    start: MinuteBucket,
    values: Vec<f64>,
}

impl MinuteSeries {
    /// Series starting at `start` with one value per consecutive minute
    pub fn new(start: MinuteBucket, values: Vec<f64>) -> Self {
        Self { start, values }
    }

    /// Mean power per minute from the first to the last reading's minute.
    ///
    /// Minutes with no reading are filled with 0.0. Returns `None` for an
    /// empty input.
    pub fn resample(readings: &[Reading]) -> Option<Self> {
        let mut per_minute: BTreeMap<MinuteBucket, (f64, usize)> = BTreeMap::new();
        for reading in readings {
            let entry = per_minute.entry(reading.bucket()).or_insert((0.0, 0));
            entry.0 += reading.power_watts;
            entry.1 += 1;
        }

        let (&start, _) = per_minute.iter().next()?;
        let (&end, _) = per_minute.iter().next_back()?;

        let len = start.minutes_until(&end) + 1;
        let values = (0..len)
            .map(|i| {
                per_minute
                    .get(&start.offset_minutes(i))
                    .map(|&(sum, count)| sum / count as f64)
                    .unwrap_or(0.0)
            })
            .collect();

        Some(Self { start, values })
    }

    pub fn start(&self) -> MinuteBucket {
        self.start
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bucket of the value at `index`
    pub fn bucket_at(&self, index: usize) -> MinuteBucket {
        self.start.offset_minutes(index as i64)
    }
}

/// Trailing moving average.
///
/// Element `j` of the output is the mean of `values[j..j + window]`, i.e. the
/// smoothed value for input index `j + window - 1`. The first `window - 1`
/// inputs have no output. An empty vector is returned when there are fewer
/// than `window` values or `window` is zero.
pub fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }

    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

/// One training example: calendar features and the smoothed power target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineSample {
    pub minute_bucket: MinuteBucket,
    pub features: FeatureVector,
    pub smoothed_power: f64,
}

/// Pair every smoothed minute with its features.
///
/// Minutes without a full window behind them are dropped, never imputed.
pub fn baseline_samples(series: &MinuteSeries, window: usize) -> Vec<BaselineSample> {
    trailing_mean(series.values(), window)
        .into_iter()
        .enumerate()
        .map(|(j, smoothed_power)| {
            let minute_bucket = series.bucket_at(j + window - 1);
            BaselineSample {
                minute_bucket,
                features: features(&minute_bucket.start()),
                smoothed_power,
            }
        })
        .collect()
}
