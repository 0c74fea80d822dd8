use super::ParamGen;
use crate::params::Activation;

/// Initial bias of the units of layer `layer` out of `layers` weight layers.
///
/// Rectifier and maxout hidden units start in their active region: 0.5 for the first hidden
/// layer, 1 for deeper ones. Tanh and output units start at 0.
pub fn initial_bias(activation: Activation, layer: usize, layers: usize) -> f32 {
    if layer + 1 == layers || activation.is_tanh() {
        0.
    } else if layer == 0 {
        0.5
    } else {
        1.
    }
}

/// Yields the same bias value until `limit` values were produced.
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }

    /// A generator for the biases of `layer`, see `initial_bias`.
    pub fn bias(activation: Activation, layer: usize, layers: usize, units: usize) -> Self {
        Self::new(initial_bias(activation, layer, layers), units)
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        let n = n.min(self.remaining);
        self.remaining -= n;
        Some(vec![self.value; n])
    }
}
