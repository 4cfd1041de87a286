//! Common types used across the application

use crate::core::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single power reading reported for an appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Appliance identifier (e.g. "laptop")
    pub appliance_id: String,
    /// Power draw in watts
    pub power_watts: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(appliance_id: &str, power_watts: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            appliance_id: appliance_id.to_string(),
            power_watts,
            timestamp,
        }
    }

    /// Reject readings that cannot be a physical power draw
    pub fn validate(&self) -> Result<()> {
        if self.appliance_id.trim().is_empty() {
            return Err(Error::InvalidInput("appliance_id must not be empty".to_string()));
        }
        if !self.power_watts.is_finite() || self.power_watts < 0.0 {
            return Err(Error::InvalidInput(format!(
                "power must be a non-negative number of watts, got {}",
                self.power_watts
            )));
        }
        Ok(())
    }

    /// Minute bucket this reading belongs to
    pub fn bucket(&self) -> MinuteBucket {
        MinuteBucket::containing(self.timestamp)
    }
}

/// A timestamp truncated to the start of its minute.
///
/// This is the join key between live readings and the forecast set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MinuteBucket(DateTime<Utc>);

impl MinuteBucket {
    /// Bucket containing the given instant (seconds and sub-seconds dropped)
    pub fn containing(timestamp: DateTime<Utc>) -> Self {
        let secs = timestamp.timestamp().rem_euclid(60);
        let nanos = i64::from(timestamp.timestamp_subsec_nanos());
        Self(timestamp - Duration::seconds(secs) - Duration::nanoseconds(nanos))
    }

    /// Bucket from a stored unix timestamp (seconds)
    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Self::containing)
    }

    /// Start of the minute
    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }

    /// Start of the minute as unix seconds
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// The bucket `minutes` minutes later
    pub fn offset_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }

    /// Whole minutes from `self` to `later`
    pub fn minutes_until(&self, later: &MinuteBucket) -> i64 {
        (later.0 - self.0).num_minutes()
    }
}

impl fmt::Display for MinuteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
    }
}

/// Expected power and spike threshold for one minute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub minute_bucket: MinuteBucket,
    pub expected_power: f64,
    pub spike_threshold: f64,
}

/// Raised when a reading exceeds its forecast threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub appliance_id: String,
    /// Offset-adjusted power that tripped the alert
    pub power_watts: f64,
    pub threshold: f64,
    pub message: String,
}

/// Calibration offset added to every incoming reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub watts: f64,
    /// Bumped on every write; 0 means never set
    pub version: u64,
}

impl Default for Offset {
    fn default() -> Self {
        Self {
            watts: 0.0,
            version: 0,
        }
    }
}
