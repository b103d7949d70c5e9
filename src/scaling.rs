//! Column scaling applied before distance and similarity computations

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Normalization strategy for a feature matrix.
///
/// The same strategy is applied column by column to every feature,
/// category counts included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Use the raw feature values
    None,
    /// Zero mean, unit (population) variance per column
    #[default]
    ZScore,
    /// Rescale each column to [0, 1]
    MinMax,
}

/// Per-column affine transform `(x - offset) / scale`, fitted on one matrix
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    offset: Array1<f64>,
    scale: Array1<f64>,
}

impl FeatureScaler {
    /// Fit the scaler on `data` (rows = samples, columns = features).
    ///
    /// Constant columns get a scale of 1 so they map to 0 under z-score and
    /// min-max instead of dividing by zero.
    pub fn fit(strategy: Normalization, data: &ArrayView2<f64>) -> Self {
        let n_features = data.ncols();

        let (offset, scale) = match strategy {
            Normalization::None => (Array1::zeros(n_features), Array1::ones(n_features)),
            Normalization::ZScore => {
                let mean = data
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(n_features));
                let std = data.std_axis(Axis(0), 0.0);
                (mean, std.mapv(non_zero_scale))
            }
            Normalization::MinMax => {
                let min = data.fold_axis(Axis(0), f64::INFINITY, |&acc, &x| acc.min(x));
                let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &x| acc.max(x));
                let range = &max - &min;
                let min = min.mapv(|m| if m.is_finite() { m } else { 0.0 });
                (min, range.mapv(non_zero_scale))
            }
        };

        Self { offset, scale }
    }

    /// Fit on `data` and return the transformed copy together with the scaler
    pub fn fit_transform(strategy: Normalization, data: &ArrayView2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(strategy, data);
        let transformed = scaler.transform(data);
        (scaler, transformed)
    }

    pub fn transform(&self, data: &ArrayView2<f64>) -> Array2<f64> {
        (data - &self.offset) / &self.scale
    }

    pub fn transform_row(&self, row: &ArrayView1<f64>) -> Array1<f64> {
        (row - &self.offset) / &self.scale
    }
}

fn non_zero_scale(s: f64) -> f64 {
    if s.is_finite() && s > f64::EPSILON {
        s
    } else {
        1.0
    }
}
