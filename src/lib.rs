//! PowerSpike Monitor library
//!
//! Forecasts an appliance's per-minute power draw for the coming hour and
//! flags live readings that exceed the forecast threshold. Exposed as a
//! library for the binaries and for tests.

pub mod core;
pub mod db;
pub mod detector;
pub mod forecast;
pub mod ingest;
pub mod scheduler;
