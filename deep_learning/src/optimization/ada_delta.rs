use serde::{Deserialize, Serialize};

use crate::storage::WildBuf;

/// AdaDelta per parameter adaptive learning rate.
///
/// Every parameter owns two accumulators in a helper buffer: the running average of squared
/// updates at `2 * i` and the running average of squared gradients at `2 * i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaDelta {
    pub rho: f32,
    pub epsilon: f32,
}

impl AdaDelta {
    /// Folds a squared gradient into the accumulators of parameter `i` and returns its rate.
    ///
    /// # Arguments
    /// * `acc` - The helper buffer, two values per parameter.
    /// * `i` - The parameter index.
    /// * `grad2` - The squared gradient.
    ///
    /// # Returns
    /// `sqrt((E[dx^2] + eps) / (E[g^2] + eps))`.
    pub fn rate(&self, acc: &WildBuf, i: usize, grad2: f64) -> f32 {
        let rho = self.rho as f64;
        let eps = self.epsilon as f64;

        let g2 = rho * acc.get(2 * i + 1) as f64 + (1. - rho) * grad2;
        acc.set(2 * i + 1, g2 as f32);

        let rate = ((acc.get(2 * i) as f64 + eps) / (g2 + eps)).sqrt();
        let dx2 = rho * acc.get(2 * i) as f64 + (1. - rho) * rate * rate * grad2;
        acc.set(2 * i, dx2 as f32);

        rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_closed_form() {
        let ada = AdaDelta {
            rho: 0.99,
            epsilon: 1e-4,
        };
        let acc = WildBuf::zeros(2);
        let grad: f64 = 0.5;

        let rate = ada.rate(&acc, 0, grad * grad);

        let (rho, eps) = (0.99f32 as f64, 1e-4f32 as f64);
        let g2 = (1. - rho) * grad * grad;
        let expected = (eps / (g2 + eps)).sqrt();
        assert!((rate as f64 - expected).abs() < 1e-6);
        assert!((acc.get(1) as f64 - g2).abs() < 1e-9);
        assert!((acc.get(0) as f64 - (1. - rho) * expected * expected * grad * grad).abs() < 1e-9);
    }

    #[test]
    fn zero_gradient_rate_is_one() {
        let ada = AdaDelta {
            rho: 0.95,
            epsilon: 1e-6,
        };
        let acc = WildBuf::zeros(4);

        assert_eq!(ada.rate(&acc, 1, 0.), 1.);
        assert_eq!(acc.as_slice(), [0.; 4]);
    }
}
