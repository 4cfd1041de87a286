//! Database module for persisting readings, forecasts and alerts
//!
//! Uses SQLite for local storage of:
//! - Raw power readings (training history)
//! - Forecast generations, with a pointer to the active one
//! - Spike alerts (append-only)
//! - The calibration offset (single versioned record)

use crate::core::{Alert, Config, Error, ForecastPoint, MinuteBucket, Offset, Reading, Result};
use crate::forecast::ForecastSet;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const OFFSET_KEY: &str = "power_offset";

/// Database manager
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database in the configured data directory
    pub fn new(config: &Config) -> Result<Self> {
        let path = config.data_dir()?.join("data.db");
        Self::open(&path)
    }

    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        log::debug!("Opened database at {}", path.display());
        Ok(db)
    }

    /// Throwaway database for tests and demo runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Raw readings
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                appliance_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                power_watts REAL NOT NULL
            );

            -- Forecast points, one generation per publication
            CREATE TABLE IF NOT EXISTS forecasts (
                generation INTEGER NOT NULL,
                minute_bucket INTEGER NOT NULL,
                expected_power REAL NOT NULL,
                spike_threshold REAL NOT NULL,
                PRIMARY KEY (generation, minute_bucket)
            );

            -- Active forecast generation
            CREATE TABLE IF NOT EXISTS forecast_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                active_generation INTEGER NOT NULL,
                generated_at INTEGER NOT NULL
            );

            -- Spike alerts
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                appliance_id TEXT NOT NULL,
                power_watts REAL NOT NULL,
                threshold REAL NOT NULL,
                message TEXT NOT NULL
            );

            -- Versioned scalar settings
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_readings_appliance_time ON readings(appliance_id, timestamp);
            "#,
        )?;

        Ok(())
    }

    // ===== Readings =====

    /// Insert a power reading
    pub fn insert_reading(&self, reading: &Reading) -> Result<()> {
        self.conn.execute(
            "INSERT INTO readings (appliance_id, timestamp, power_watts) VALUES (?1, ?2, ?3)",
            params![reading.appliance_id, reading.timestamp.timestamp(), reading.power_watts],
        )?;

        Ok(())
    }

    /// Readings of one appliance with `start <= timestamp <= end`, oldest first
    pub fn get_readings(&self, appliance_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Reading>> {
        let mut stmt = self.conn.prepare(
            "SELECT appliance_id, timestamp, power_watts
             FROM readings
             WHERE appliance_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;

        let readings = stmt
            .query_map(params![appliance_id, start.timestamp(), end.timestamp()], |row| {
                Ok(Reading {
                    appliance_id: row.get(0)?,
                    timestamp: datetime_from_row(row.get(1)?, 1)?,
                    power_watts: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(readings)
    }

    /// Get total readings count
    pub fn get_readings_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete readings older than `days_to_keep` days before `now`
    pub fn cleanup_old_readings(&self, days_to_keep: u32, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now.timestamp() - (i64::from(days_to_keep) * 24 * 60 * 60);

        let deleted = self.conn.execute(
            "DELETE FROM readings WHERE timestamp < ?1",
            params![cutoff],
        )?;

        Ok(deleted as u64)
    }

    // ===== Forecasts =====

    /// Publish a new forecast generation.
    ///
    /// The new rows are written, the active pointer is flipped and every older
    /// generation is dropped inside a single transaction.
    pub fn replace_forecasts(&self, points: &[ForecastPoint], generated_at: DateTime<Utc>) -> Result<ForecastSet> {
        let tx = self.conn.unchecked_transaction()?;

        let active: Option<i64> = tx
            .query_row("SELECT active_generation FROM forecast_state WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        let generation = active.unwrap_or(0) + 1;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO forecasts (generation, minute_bucket, expected_power, spike_threshold)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in points {
                stmt.execute(params![
                    generation,
                    point.minute_bucket.unix(),
                    point.expected_power,
                    point.spike_threshold
                ])?;
            }
        }

        tx.execute(
            r#"INSERT INTO forecast_state (id, active_generation, generated_at)
               VALUES (1, ?1, ?2)
               ON CONFLICT(id) DO UPDATE SET
                   active_generation = ?1,
                   generated_at = ?2"#,
            params![generation, generated_at.timestamp()],
        )?;
        tx.execute("DELETE FROM forecasts WHERE generation <> ?1", params![generation])?;
        tx.commit()?;

        // Stored at second resolution; hand back exactly what a reload would see
        let generated_at = DateTime::from_timestamp(generated_at.timestamp(), 0).unwrap_or(generated_at);
        Ok(ForecastSet::new(generation as u64, generated_at, points.to_vec()))
    }

    /// The currently active forecast generation (empty if none was published)
    pub fn load_active_forecasts(&self) -> Result<ForecastSet> {
        let state: Option<(i64, i64)> = self
            .conn
            .query_row(
                "SELECT active_generation, generated_at FROM forecast_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((generation, generated_at)) = state else {
            return Ok(ForecastSet::empty());
        };

        let mut stmt = self.conn.prepare(
            "SELECT minute_bucket, expected_power, spike_threshold
             FROM forecasts
             WHERE generation = ?1
             ORDER BY minute_bucket ASC",
        )?;

        let points = stmt
            .query_map(params![generation], |row| {
                let bucket: i64 = row.get(0)?;
                Ok(ForecastPoint {
                    minute_bucket: MinuteBucket::from_unix(bucket)
                        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, bucket))?,
                    expected_power: row.get(1)?,
                    spike_threshold: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let generated_at = DateTime::from_timestamp(generated_at, 0)
            .ok_or(Error::Database(rusqlite::Error::IntegralValueOutOfRange(1, generated_at)))?;

        Ok(ForecastSet::new(generation as u64, generated_at, points))
    }

    // ===== Alerts =====

    /// Append an alert
    pub fn insert_alert(&self, alert: &Alert) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO alerts (timestamp, appliance_id, power_watts, threshold, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.timestamp.timestamp(),
                alert.appliance_id,
                alert.power_watts,
                alert.threshold,
                alert.message
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent alerts, newest first
    pub fn recent_alerts(&self, limit: u32) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, appliance_id, power_watts, threshold, message
             FROM alerts ORDER BY id DESC LIMIT ?1",
        )?;

        let alerts = stmt
            .query_map(params![limit], |row| {
                Ok(Alert {
                    timestamp: datetime_from_row(row.get(0)?, 0)?,
                    appliance_id: row.get(1)?,
                    power_watts: row.get(2)?,
                    threshold: row.get(3)?,
                    message: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(alerts)
    }

    // ===== Calibration offset =====

    /// Current offset; zero at version 0 if it was never set
    pub fn get_offset(&self) -> Result<Offset> {
        let offset = self
            .conn
            .query_row(
                "SELECT value, version FROM settings WHERE key = ?1",
                params![OFFSET_KEY],
                |row| {
                    let version: i64 = row.get(1)?;
                    Ok(Offset {
                        watts: row.get(0)?,
                        version: version as u64,
                    })
                },
            )
            .optional()?;

        Ok(offset.unwrap_or_default())
    }

    /// Set the offset, bumping its version
    pub fn set_offset(&self, watts: f64) -> Result<Offset> {
        if !watts.is_finite() {
            return Err(Error::InvalidInput(format!("offset must be finite, got {}", watts)));
        }

        self.conn.execute(
            r#"INSERT INTO settings (key, value, version, updated_at)
               VALUES (?1, ?2, 1, ?3)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   version = settings.version + 1,
                   updated_at = excluded.updated_at"#,
            params![OFFSET_KEY, watts, Utc::now().timestamp()],
        )?;

        self.get_offset()
    }
}

fn datetime_from_row(secs: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, secs))
}
