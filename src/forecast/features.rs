//! Calendar features derived from a timestamp
//!
//! Both the trainer and the forecast generator go through [`features`], so the
//! model is always queried with the same encoding it was fit on. Everything is
//! computed in UTC.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Number of model inputs produced by [`FeatureVector::to_array`]
pub const FEATURE_COUNT: usize = 4;

/// Names of the model inputs, in array order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["hour", "minute", "day_of_week", "is_weekend"];

/// Time features for one minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Minute of hour (0-59)
    pub minute: u32,
    /// Day of week (0 = Monday, 6 = Sunday)
    pub day_of_week: u32,
    /// Saturday or Sunday
    pub is_weekend: bool,
}

impl FeatureVector {
    /// Numeric encoding fed to the regressor
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.hour),
            f64::from(self.minute),
            f64::from(self.day_of_week),
            if self.is_weekend { 1.0 } else { 0.0 },
        ]
    }
}

/// Extract the feature vector for a timestamp
pub fn features(timestamp: &DateTime<Utc>) -> FeatureVector {
    let day_of_week = timestamp.weekday().num_days_from_monday();

    FeatureVector {
        hour: timestamp.hour(),
        minute: timestamp.minute(),
        day_of_week,
        is_weekend: day_of_week >= 5,
    }
}
