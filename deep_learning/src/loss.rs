use serde::{Deserialize, Serialize};

/// Loss function minimized by the output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// CrossEntropy for classification, derived from the distribution otherwise.
    #[default]
    Automatic,
    Quadratic,
    CrossEntropy,
    Huber,
    Absolute,
}

impl Loss {
    /// Partial derivative `-dE/dnet` of a softmax unit.
    ///
    /// # Arguments
    /// * `t` - The one-hot target for this unit (0 or 1).
    /// * `y` - The unit's softmax activation.
    pub fn softmax_gradient(self, t: f64, y: f64) -> f64 {
        match self {
            Loss::Automatic | Loss::CrossEntropy => t - y,
            Loss::Absolute => (2. * t - 1.) * (1. - y) * y,
            Loss::Quadratic => (t - y) * (1. - y) * y,
            Loss::Huber => {
                let g = if t == 0. {
                    if y < 0.5 { -4. * y } else { -2. }
                } else if y > 0.5 {
                    4. * (1. - y)
                } else {
                    2.
                };
                g * (1. - y) * y
            }
        }
    }
}

/// Response distribution of the model, selects the gradient of linear outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Auto,
    Bernoulli,
    Multinomial,
    Gaussian,
    Laplace,
    Huber,
}

impl Distribution {
    /// Whether this distribution describes a categorical response.
    pub fn is_categorical(self) -> bool {
        matches!(self, Distribution::Bernoulli | Distribution::Multinomial)
    }

    /// Negative gradient of the deviance with respect to the prediction `f`, in link space.
    ///
    /// # Arguments
    /// * `t` - The target.
    /// * `f` - The prediction (plus offset).
    /// * `huber_delta` - Residual threshold where huber switches from quadratic to linear.
    pub fn negative_gradient(self, t: f64, f: f64, huber_delta: f64) -> f64 {
        let r = t - f;
        match self {
            Distribution::Laplace => {
                if r > 0. {
                    1.
                } else if r < 0. {
                    -1.
                } else {
                    0.
                }
            }
            Distribution::Huber if r.abs() > huber_delta => huber_delta * r.signum(),
            _ => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_entropy() {
        assert_eq!(Loss::CrossEntropy.softmax_gradient(1., 0.25), 0.75);
        assert_eq!(Loss::Automatic.softmax_gradient(0., 0.25), -0.25);
    }

    #[test]
    fn quadratic_and_absolute() {
        let y = 0.25;
        assert_eq!(Loss::Quadratic.softmax_gradient(1., y), 0.75 * 0.75 * 0.25);
        assert_eq!(Loss::Absolute.softmax_gradient(0., y), -0.75 * 0.25);
    }

    #[test]
    fn huber_pieces() {
        let dydnet = |y: f64| (1. - y) * y;
        assert_eq!(Loss::Huber.softmax_gradient(0., 0.25), -1. * dydnet(0.25));
        assert_eq!(Loss::Huber.softmax_gradient(0., 0.75), -2. * dydnet(0.75));
        assert_eq!(Loss::Huber.softmax_gradient(1., 0.75), 1. * dydnet(0.75));
        assert_eq!(Loss::Huber.softmax_gradient(1., 0.25), 2. * dydnet(0.25));
    }

    #[test]
    fn distribution_gradients() {
        assert_eq!(Distribution::Gaussian.negative_gradient(1., 3., 1.), -2.);
        assert_eq!(Distribution::Laplace.negative_gradient(1., 3., 1.), -1.);
        assert_eq!(Distribution::Laplace.negative_gradient(3., 1., 1.), 1.);
        assert_eq!(Distribution::Huber.negative_gradient(1., 3., 0.5), -0.5);
        assert_eq!(Distribution::Huber.negative_gradient(1., 1.25, 0.5), -0.25);
    }
}
