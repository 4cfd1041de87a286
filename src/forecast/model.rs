//! Gradient-boosted regression trees for the baseline curve
//!
//! Squared-error boosting with fixed hyperparameters. Each round fits a
//! shallow smartcore regression tree to the current residuals. All features
//! are considered at every split, so no randomness is involved: identical
//! samples give an identical model.

use crate::core::Result;
use crate::forecast::baseline::BaselineSample;
use crate::forecast::features::{FeatureVector, FEATURE_NAMES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{DecisionTreeRegressor, DecisionTreeRegressorParameters};

/// Number of boosting rounds
pub const N_ESTIMATORS: usize = 100;
/// Maximum depth of each tree
pub const MAX_DEPTH: u16 = 3;
/// Shrinkage applied to every tree's output
pub const LEARNING_RATE: f64 = 0.1;

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// A fitted baseline model. Immutable once built.
#[derive(Debug, Serialize, Deserialize)]
pub struct BaselineModel {
    appliance_id: String,
    trained_at: DateTime<Utc>,
    sample_count: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

fn tree_parameters() -> DecisionTreeRegressorParameters {
    DecisionTreeRegressorParameters::default().with_max_depth(MAX_DEPTH)
}

fn design_matrix(rows: &[FeatureVector]) -> DenseMatrix<f64> {
    let rows: Vec<Vec<f64>> = rows.iter().map(|fv| fv.to_array().to_vec()).collect();
    DenseMatrix::from_2d_vec(&rows)
}

impl BaselineModel {
    /// Fit on the given samples. Callers enforce the minimum sample count.
    pub(crate) fn fit(appliance_id: &str, samples: &[BaselineSample], trained_at: DateTime<Utc>) -> Result<Self> {
        let targets: Vec<f64> = samples.iter().map(|s| s.smoothed_power).collect();

        let base_score = if targets.is_empty() {
            0.0
        } else {
            targets.iter().sum::<f64>() / targets.len() as f64
        };

        let mut trees = Vec::with_capacity(N_ESTIMATORS);

        if !samples.is_empty() {
            log::debug!(
                "Boosting {} trees of depth {} over {:?}",
                N_ESTIMATORS,
                MAX_DEPTH,
                FEATURE_NAMES
            );

            let features: Vec<FeatureVector> = samples.iter().map(|s| s.features).collect();
            let x = design_matrix(&features);
            let mut predictions = vec![base_score; targets.len()];

            for _ in 0..N_ESTIMATORS {
                let residuals: Vec<f64> = targets
                    .iter()
                    .zip(&predictions)
                    .map(|(y, p)| y - p)
                    .collect();

                let tree = Tree::fit(&x, &residuals, tree_parameters())?;
                for (prediction, step) in predictions.iter_mut().zip(tree.predict(&x)?) {
                    *prediction += LEARNING_RATE * step;
                }
                trees.push(tree);
            }
        }

        Ok(Self {
            appliance_id: appliance_id.to_string(),
            trained_at,
            sample_count: samples.len(),
            base_score,
            learning_rate: LEARNING_RATE,
            trees,
        })
    }

    /// Expected power for each of the given minutes, in order
    pub fn predict_many(&self, features: &[FeatureVector]) -> Result<Vec<f64>> {
        let mut predictions = vec![self.base_score; features.len()];
        if features.is_empty() {
            return Ok(predictions);
        }

        let x = design_matrix(features);
        for tree in &self.trees {
            for (prediction, step) in predictions.iter_mut().zip(tree.predict(&x)?) {
                *prediction += self.learning_rate * step;
            }
        }
        Ok(predictions)
    }

    /// Expected power for one minute
    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let predictions = self.predict_many(std::slice::from_ref(features))?;
        Ok(predictions.first().copied().unwrap_or(self.base_score))
    }

    pub fn appliance_id(&self) -> &str {
        &self.appliance_id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Number of baseline samples the model was fit on
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}
