//! Historical dataset import
//!
//! Reads an exported power log so a model can be trained before any live
//! readings exist. The file is a CSV with a header row: a `time` column and
//! one power column per appliance (watts). Blank power cells count as 0 W.

use crate::core::{Error, Reading, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io;

/// Name of the timestamp column
pub const TIME_COLUMN: &str = "time";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse an RFC 3339 timestamp, or a naive one taken as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Read `column` of a historical CSV as readings for `appliance_id`
pub fn read_csv<R: io::Read>(reader: R, appliance_id: &str, column: &str) -> Result<Vec<Reading>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::InvalidInput(format!("dataset has no '{}' column", name)))
    };
    let time_idx = position(TIME_COLUMN)?;
    let power_idx = position(column)?;

    let mut readings = Vec::new();
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = row + 2;

        let raw_time = record.get(time_idx).unwrap_or_default();
        let timestamp = parse_timestamp(raw_time)
            .ok_or_else(|| Error::InvalidInput(format!("line {}: bad timestamp '{}'", line, raw_time)))?;

        let raw_power = record.get(power_idx).unwrap_or_default();
        let power = if raw_power.is_empty() {
            0.0
        } else {
            raw_power
                .parse::<f64>()
                .map_err(|_| Error::InvalidInput(format!("line {}: bad power value '{}'", line, raw_power)))?
        };

        let reading = Reading::new(appliance_id, power, timestamp);
        reading.validate()?;
        readings.push(reading);
    }

    readings.sort_by_key(|r| r.timestamp);
    log::info!("Read {} historical readings from column '{}'", readings.len(), column);
    Ok(readings)
}
