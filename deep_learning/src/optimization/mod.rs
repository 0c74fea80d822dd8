mod ada_delta;
pub mod momentum;
mod schedule;

use serde::{Deserialize, Serialize};

pub use ada_delta::AdaDelta;
pub use schedule::ManualRate;

use crate::{
    params::DeepLearningParams,
    storage::{DenseVector, WildBuf},
};

/// The rule used to turn gradients into parameter updates, fixed when the model is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    Manual(ManualRate),
    AdaDelta(AdaDelta),
}

impl UpdateRule {
    pub fn from_params(params: &DeepLearningParams) -> Self {
        if params.adaptive_rate {
            return Self::AdaDelta(AdaDelta {
                rho: params.rho as f32,
                epsilon: params.epsilon as f32,
            });
        }

        Self::Manual(ManualRate {
            rate: params.rate,
            rate_annealing: params.rate_annealing,
            rate_decay: params.rate_decay,
            momentum_start: params.momentum_start,
            momentum_ramp: params.momentum_ramp,
            momentum_stable: params.momentum_stable,
            nesterov: params.nesterov_accelerated_gradient,
        })
    }
}

/// Auxiliary optimizer arrays of a model, one entry per layer transition.
///
/// Momentum and AdaDelta helpers are mutually exclusive, a model carries at most one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerState {
    /// Manual rate without momentum, nothing to remember.
    Plain,
    /// Previous update (classic) or velocity (Nesterov) of every weight and bias.
    Momentum {
        weights: Vec<DenseVector>,
        biases: Vec<DenseVector>,
    },
    /// Two accumulators per weight and bias.
    AdaDelta {
        weights: Vec<DenseVector>,
        biases: Vec<DenseVector>,
    },
}

/// Borrowed optimizer arrays of a single layer transition.
#[derive(Debug, Clone, Copy)]
pub enum LayerState<'a> {
    Plain,
    Momentum {
        weights: &'a WildBuf,
        biases: &'a WildBuf,
    },
    AdaDelta {
        weights: &'a WildBuf,
        biases: &'a WildBuf,
    },
}

impl OptimizerState {
    /// Allocates zeroed helper arrays for the given update rule.
    ///
    /// # Arguments
    /// * `rule` - The model's update rule.
    /// * `sizes` - Amount of `(weights, biases)` of every layer transition.
    ///
    /// # Returns
    /// A new `OptimizerState` instance.
    pub fn new(rule: &UpdateRule, sizes: &[(usize, usize)]) -> Self {
        let alloc = |mult: usize| {
            let weights = sizes.iter().map(|(w, _)| DenseVector::zeros(mult * w)).collect();
            let biases = sizes.iter().map(|(_, b)| DenseVector::zeros(mult * b)).collect();
            (weights, biases)
        };

        match rule {
            UpdateRule::AdaDelta(_) => {
                let (weights, biases) = alloc(2);
                Self::AdaDelta { weights, biases }
            }
            UpdateRule::Manual(m) if m.has_momentum() => {
                let (weights, biases) = alloc(1);
                Self::Momentum { weights, biases }
            }
            UpdateRule::Manual(_) => Self::Plain,
        }
    }

    pub fn layer(&self, i: usize) -> LayerState<'_> {
        match self {
            OptimizerState::Plain => LayerState::Plain,
            OptimizerState::Momentum { weights, biases } => LayerState::Momentum {
                weights: weights[i].data(),
                biases: biases[i].data(),
            },
            OptimizerState::AdaDelta { weights, biases } => LayerState::AdaDelta {
                weights: weights[i].data(),
                biases: biases[i].data(),
            },
        }
    }

    pub fn has_momenta(&self) -> bool {
        matches!(self, OptimizerState::Momentum { .. })
    }

    pub fn is_ada_delta(&self) -> bool {
        matches!(self, OptimizerState::AdaDelta { .. })
    }

    fn arrays_mut(&mut self) -> Vec<&mut DenseVector> {
        match self {
            OptimizerState::Plain => Vec::new(),
            OptimizerState::Momentum { weights, biases }
            | OptimizerState::AdaDelta { weights, biases } => {
                weights.iter_mut().chain(biases.iter_mut()).collect()
            }
        }
    }

    fn arrays(&self) -> Vec<&DenseVector> {
        match self {
            OptimizerState::Plain => Vec::new(),
            OptimizerState::Momentum { weights, biases }
            | OptimizerState::AdaDelta { weights, biases } => {
                weights.iter().chain(biases.iter()).collect()
            }
        }
    }

    /// Adds `other`'s helper arrays into this one, both must be of the same kind and shape.
    pub(crate) fn add(&mut self, other: &OptimizerState) {
        let others = other.arrays();
        for (mine, theirs) in self.arrays_mut().into_iter().zip(others) {
            let mut view = mine.view_mut();
            view += &theirs.view();
        }
    }

    /// Applies `f` to every helper value.
    pub(crate) fn map_inplace(&mut self, f: impl Fn(f32) -> f32 + Copy) {
        for array in self.arrays_mut() {
            array.view_mut().mapv_inplace(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(momentum: f64) -> UpdateRule {
        UpdateRule::Manual(ManualRate {
            rate: 0.1,
            rate_annealing: 0.,
            rate_decay: 1.,
            momentum_start: momentum,
            momentum_ramp: 0.,
            momentum_stable: momentum,
            nesterov: true,
        })
    }

    #[test]
    fn state_follows_rule() {
        let sizes = [(6, 3), (3, 1)];

        assert!(matches!(OptimizerState::new(&manual(0.), &sizes), OptimizerState::Plain));
        assert!(OptimizerState::new(&manual(0.5), &sizes).has_momenta());

        let ada = UpdateRule::AdaDelta(AdaDelta {
            rho: 0.99,
            epsilon: 1e-8,
        });
        let OptimizerState::AdaDelta { weights, biases } = OptimizerState::new(&ada, &sizes) else {
            panic!("expected AdaDelta helpers");
        };
        assert_eq!(weights[0].size(), 12);
        assert_eq!(biases[1].size(), 2);
    }

    #[test]
    fn add_and_map() {
        let sizes = [(2, 1)];
        let mut a = OptimizerState::new(&manual(0.5), &sizes);
        let b = OptimizerState::new(&manual(0.5), &sizes);

        if let LayerState::Momentum { weights, biases } = b.layer(0) {
            weights.set(1, 4.);
            biases.set(0, 2.);
        }

        a.add(&b);
        a.add(&b);
        a.map_inplace(|v| v * 0.5);

        let LayerState::Momentum { weights, biases } = a.layer(0) else {
            panic!("expected momentum helpers");
        };
        assert_eq!(weights.as_slice(), [0., 4.]);
        assert_eq!(biases.as_slice(), [2.]);
    }
}
