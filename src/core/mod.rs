//! Core module - Configuration, errors, and common types

mod config;
mod error;
mod types;

pub use config::{Config, ForecastConfig, GeneralConfig, ScheduleConfig, TrainingConfig, CONFIG_ENV_VAR};
pub use error::{Error, Result};
pub use types::{Alert, ForecastPoint, MinuteBucket, Offset, Reading};
