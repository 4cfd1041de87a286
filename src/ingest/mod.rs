//! Ingest pipeline
//!
//! Store the raw reading, read the calibration offset, classify, and append an
//! alert for spikes. The database lock is only held for the individual
//! reads and writes; classification itself runs against the forecast store.

use crate::core::{Reading, Result};
use crate::db::Database;
use crate::detector::{SpikeDetector, SpikeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A reading as reported by a sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub appliance_id: String,
    /// Power in watts
    pub power: f64,
    /// Defaults to the time of ingestion
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Reply sent back to the sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub spike_detected: bool,
    pub classification: SpikeStatus,
    pub message: String,
}

/// Stores readings and checks them for spikes
pub struct IngestService {
    db: Arc<Mutex<Database>>,
    detector: SpikeDetector,
}

impl IngestService {
    pub fn new(db: Arc<Mutex<Database>>, detector: SpikeDetector) -> Self {
        Self { db, detector }
    }

    /// Handle one reading
    pub async fn ingest(&self, request: IngestRequest, now: DateTime<Utc>) -> Result<IngestResponse> {
        let reading = Reading::new(
            &request.appliance_id,
            request.power,
            request.timestamp.unwrap_or(now),
        );
        reading.validate()?;

        let offset = {
            let db = self.db.lock().await;
            db.insert_reading(&reading)?;
            db.get_offset()?
        };

        let evaluation = self.detector.evaluate(&reading, offset.watts);

        if let Some(alert) = &evaluation.alert {
            let db = self.db.lock().await;
            db.insert_alert(alert)?;
        }

        Ok(IngestResponse {
            status: "success".to_string(),
            spike_detected: evaluation.is_spike(),
            classification: evaluation.status,
            message: evaluation.message,
        })
    }
}
