//! Baseline forecasting pipeline
//!
//! history -> [`baseline`] (resample + smooth) -> [`trainer`] -> model ->
//! [`generator`] -> forecast set -> [`store`] (published for detectors).
//! [`dataset`] feeds the trainer from an exported log instead of live history.

pub mod baseline;
pub mod dataset;
pub mod features;
pub mod generator;
pub mod model;
pub mod repository;
pub mod store;
pub mod trainer;

pub use baseline::{baseline_samples, trailing_mean, BaselineSample, MinuteSeries};
pub use features::{features, FeatureVector};
pub use generator::{ForecastGenerator, FORECAST_HORIZON_MINUTES};
pub use model::BaselineModel;
pub use repository::{FileModelRepository, MemoryModelRepository, ModelHandle, ModelRepository};
pub use store::{ForecastSet, ForecastStore};
pub use trainer::BaselineTrainer;
