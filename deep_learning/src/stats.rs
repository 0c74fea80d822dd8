use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{ModelInfo, optimization::LayerState};

/// Largest acceptable absolute mean or RMS of a layer's weights.
pub const WEIGHT_THRESHOLD: f64 = 1e10;
/// Largest acceptable absolute mean or RMS of a layer's biases.
pub const BIAS_THRESHOLD: f64 = 1e5;

/// Mean and RMS (deviation from the mean) of one layer transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub mean_weight: f64,
    pub rms_weight: f64,
    pub mean_bias: f64,
    pub rms_bias: f64,
    /// AdaDelta per weight rates, only for adaptive models.
    pub mean_rate: Option<f64>,
    pub rms_rate: Option<f64>,
}

impl LayerStats {
    pub fn is_unstable(&self) -> bool {
        [self.mean_weight, self.rms_weight, self.mean_bias, self.rms_bias]
            .iter()
            .any(|v| v.is_nan())
            || self.mean_weight.abs() > WEIGHT_THRESHOLD
            || self.rms_weight > WEIGHT_THRESHOLD
            || self.mean_bias.abs() > BIAS_THRESHOLD
            || self.rms_bias > BIAS_THRESHOLD
    }
}

/// Diagnostics of a whole model, computed after each synchronization point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub layers: Vec<LayerStats>,
    pub unstable: bool,
}

impl Diagnostics {
    /// Computes the statistics of every layer of `model` in parallel.
    pub fn compute(model: &ModelInfo) -> Self {
        let epsilon = model.params().epsilon as f32;

        let layers: Vec<_> = (0..model.layers())
            .into_par_iter()
            .map(|i| {
                let (mean_weight, rms_weight) = mean_rms(model.weights(i).raw());
                let (mean_bias, rms_bias) = mean_rms(model.biases(i).raw());

                let (mean_rate, rms_rate) = match model.optimizer().layer(i) {
                    LayerState::AdaDelta { weights, .. } => {
                        let rates: Vec<f32> = weights
                            .as_slice()
                            .chunks_exact(2)
                            .map(|acc| ((acc[0] + epsilon) / (acc[1] + epsilon)).sqrt())
                            .collect();
                        let (mean, rms) = mean_rms(&rates);
                        (Some(mean), Some(rms))
                    }
                    _ => (None, None),
                };

                LayerStats {
                    mean_weight,
                    rms_weight,
                    mean_bias,
                    rms_bias,
                    mean_rate,
                    rms_rate,
                }
            })
            .collect();

        let unstable = layers.iter().any(LayerStats::is_unstable);
        Self { layers, unstable }
    }
}

fn mean_rms(values: &[f32]) -> (f64, f64) {
    let values = ArrayView1::from(values).mapv(f64::from);
    let Some(mean) = values.mean() else {
        return (0., 0.);
    };

    let rms = values.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.).sqrt();
    (mean, rms)
}
