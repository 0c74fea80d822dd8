use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    DlErr, Result, dropout,
    loss::{Distribution, Loss},
};

/// Hidden layer activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Tanh,
    TanhWithDropout,
    #[default]
    Rectifier,
    RectifierWithDropout,
    Maxout,
    MaxoutWithDropout,
}

impl Activation {
    pub fn has_dropout(self) -> bool {
        matches!(
            self,
            Activation::TanhWithDropout
                | Activation::RectifierWithDropout
                | Activation::MaxoutWithDropout
        )
    }

    pub fn is_maxout(self) -> bool {
        matches!(self, Activation::Maxout | Activation::MaxoutWithDropout)
    }

    pub fn is_rectifier(self) -> bool {
        matches!(self, Activation::Rectifier | Activation::RectifierWithDropout)
    }

    pub fn is_tanh(self) -> bool {
        matches!(self, Activation::Tanh | Activation::TanhWithDropout)
    }

    /// Salt mixed into the row seed to regenerate this activation's dropout mask.
    pub fn dropout_salt(self) -> u64 {
        match self {
            Activation::Tanh | Activation::TanhWithDropout => dropout::TANH_SALT,
            Activation::Rectifier | Activation::RectifierWithDropout => dropout::RECTIFIER_SALT,
            Activation::Maxout | Activation::MaxoutWithDropout => dropout::MAXOUT_SALT,
        }
    }

    /// How many weight rows each hidden unit owns.
    pub fn width_multiplier(self) -> usize {
        if self.is_maxout() { 2 } else { 1 }
    }
}

/// Distribution of the initial weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialWeightDistribution {
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    #[default]
    UniformAdaptive,
    /// Uniform in `±initial_weight_scale`.
    Uniform,
    /// Normal with standard deviation `initial_weight_scale`.
    Normal,
}

/// User facing parameters of a deep learning model.
///
/// `validate` rejects inconsistent combinations, `sanitize` fills in the derived defaults. A
/// `ModelInfo` always holds a validated and sanitized copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepLearningParams {
    pub seed: u64,
    pub activation: Activation,
    pub hidden: Vec<usize>,
    pub epochs: f64,
    /// Samples per round: 0 one epoch, -1 all rows (on every node when replicated), -2 same
    /// as -1, any positive value is taken literally.
    pub train_samples_per_iteration: i64,

    pub adaptive_rate: bool,
    pub rho: f64,
    pub epsilon: f64,
    pub rate: f64,
    pub rate_annealing: f64,
    pub rate_decay: f64,
    pub momentum_start: f64,
    pub momentum_ramp: f64,
    pub momentum_stable: f64,
    pub nesterov_accelerated_gradient: bool,

    pub input_dropout_ratio: f64,
    pub hidden_dropout_ratios: Option<Vec<f64>>,
    pub l1: f64,
    pub l2: f64,
    /// Upper bound for the squared L2 norm of each unit's incoming weights, `None` is unbounded.
    pub max_w2: Option<f32>,

    pub initial_weight_distribution: InitialWeightDistribution,
    pub initial_weight_scale: f64,

    pub loss: Loss,
    pub distribution: Distribution,
    pub huber_delta: f64,

    pub fast_mode: bool,
    pub replicate_training_data: bool,
    pub shuffle_training_data: bool,
    pub mini_batch_size: usize,

    pub elastic_averaging: bool,
    pub elastic_averaging_moving_rate: f64,
    pub elastic_averaging_regularization: f64,

    pub sparse: bool,
    pub col_major: bool,
    pub max_categorical_features: usize,
    pub autoencoder: bool,
    /// Strength of the pull of hidden autoencoder units towards `average_activation`.
    pub sparsity_beta: f64,
    /// Target mean activation of hidden autoencoder units.
    pub average_activation: f64,
}

impl Default for DeepLearningParams {
    fn default() -> Self {
        Self {
            seed: rand::random(),
            activation: Activation::Rectifier,
            hidden: vec![200, 200],
            epochs: 10.,
            train_samples_per_iteration: -2,
            adaptive_rate: true,
            rho: 0.99,
            epsilon: 1e-8,
            rate: 0.005,
            rate_annealing: 1e-6,
            rate_decay: 1.,
            momentum_start: 0.,
            momentum_ramp: 1e6,
            momentum_stable: 0.,
            nesterov_accelerated_gradient: true,
            input_dropout_ratio: 0.,
            hidden_dropout_ratios: None,
            l1: 0.,
            l2: 0.,
            max_w2: None,
            initial_weight_distribution: InitialWeightDistribution::UniformAdaptive,
            initial_weight_scale: 1.,
            loss: Loss::Automatic,
            distribution: Distribution::Auto,
            huber_delta: 1.,
            fast_mode: true,
            replicate_training_data: true,
            shuffle_training_data: false,
            mini_batch_size: 1,
            elastic_averaging: false,
            elastic_averaging_moving_rate: 0.9,
            elastic_averaging_regularization: 1e-3,
            sparse: false,
            col_major: false,
            max_categorical_features: usize::MAX,
            autoencoder: false,
            sparsity_beta: 0.,
            average_activation: 0.,
        }
    }
}

impl DeepLearningParams {
    /// Checks the parameters for a problem with `n_classes` response classes (1 for regression
    /// and autoencoders).
    ///
    /// # Returns
    /// The first configuration error found.
    pub fn validate(&self, n_classes: usize) -> Result<()> {
        let classification = n_classes > 1 && !self.autoencoder;

        if self.hidden.is_empty() {
            return Err(DlErr::config("hidden", "there must be at least one hidden layer"));
        }
        if self.hidden.contains(&0) {
            return Err(DlErr::config("hidden", "hidden layer size must be positive"));
        }
        if self.mini_batch_size < 1 {
            return Err(DlErr::config("mini_batch_size", "mini-batch size must be >= 1"));
        }
        if !(self.epochs > 0.) {
            return Err(DlErr::config("epochs", "epochs must be positive"));
        }
        if self.train_samples_per_iteration < -2 {
            return Err(DlErr::config(
                "train_samples_per_iteration",
                "must be -2, -1, 0 or a positive number of samples",
            ));
        }

        if let Some(ratios) = &self.hidden_dropout_ratios {
            if ratios.len() != self.hidden.len() {
                return Err(DlErr::config(
                    "hidden_dropout_ratios",
                    format!("must have {} hidden layer dropout ratios", self.hidden.len()),
                ));
            }
            if !self.activation.has_dropout() && ratios.iter().any(|r| *r != 0.) {
                return Err(DlErr::config(
                    "hidden_dropout_ratios",
                    "hidden dropout ratios require a dropout activation function",
                ));
            }
            if ratios.iter().any(|r| !(0. ..1.).contains(r)) {
                return Err(DlErr::config(
                    "hidden_dropout_ratios",
                    "hidden dropout ratios must be >= 0 and < 1",
                ));
            }
        }
        if !(0. ..1.).contains(&self.input_dropout_ratio) {
            return Err(DlErr::config("input_dropout_ratio", "input dropout must be >= 0 and < 1"));
        }

        if self.l1 < 0. {
            return Err(DlErr::config("l1", "L1 penalty must be >= 0"));
        }
        if self.l2 < 0. {
            return Err(DlErr::config("l2", "L2 penalty must be >= 0"));
        }
        if let Some(max_w2) = self.max_w2
            && !(max_w2 > 0.)
        {
            return Err(DlErr::config("max_w2", "max_w2 must be positive"));
        }
        if !(self.initial_weight_scale > 0.) {
            return Err(DlErr::config("initial_weight_scale", "initial weight scale must be positive"));
        }

        self.validate_update_rule()?;

        if self.elastic_averaging {
            if !(0. ..=1.).contains(&self.elastic_averaging_moving_rate) {
                return Err(DlErr::config(
                    "elastic_averaging_moving_rate",
                    "elastic averaging moving rate must be between 0 and 1",
                ));
            }
            if self.elastic_averaging_regularization < 0. {
                return Err(DlErr::config(
                    "elastic_averaging_regularization",
                    "elastic averaging regularization strength must be >= 0",
                ));
            }
            if self.sparse {
                return Err(DlErr::config(
                    "elastic_averaging",
                    "cannot use elastic averaging for sparse data handling",
                ));
            }
        }

        if self.max_categorical_features < 1 {
            return Err(DlErr::config(
                "max_categorical_features",
                "max_categorical_features must be at least 1",
            ));
        }
        if self.col_major && !self.sparse {
            return Err(DlErr::config(
                "col_major",
                "cannot use column major storage for non-sparse data handling",
            ));
        }
        if self.col_major && self.activation.is_maxout() {
            return Err(DlErr::config("col_major", "column major storage doesn't support maxout"));
        }

        if self.autoencoder {
            if self.loss == Loss::CrossEntropy {
                return Err(DlErr::config("loss", "cannot use CrossEntropy loss for auto-encoder"));
            }
            if self.activation.is_maxout() {
                return Err(DlErr::config(
                    "activation",
                    "maxout activation is not supported for auto-encoder",
                ));
            }
        }
        self.validate_sparsity()?;

        self.validate_loss(classification)
    }

    fn validate_sparsity(&self) -> Result<()> {
        if !(self.sparsity_beta >= 0.) {
            return Err(DlErr::config("sparsity_beta", "sparsity beta must be >= 0"));
        }
        if self.sparsity_beta == 0. {
            return Ok(());
        }
        if !self.autoencoder {
            return Err(DlErr::config(
                "sparsity_beta",
                "sparsity beta can only be used for auto-encoder",
            ));
        }

        let target = self.average_activation;
        if self.activation.is_tanh() && !(-1. < target && target < 1.) {
            return Err(DlErr::config(
                "average_activation",
                "tanh average activation must be in (-1, 1)",
            ));
        }
        if self.activation.is_rectifier() && !(target > 0.) {
            return Err(DlErr::config(
                "average_activation",
                "rectifier average activation must be positive",
            ));
        }
        Ok(())
    }

    /// Whether hidden autoencoder units track their mean activation.
    pub fn has_sparsity(&self) -> bool {
        self.autoencoder && self.sparsity_beta > 0.
    }

    fn validate_update_rule(&self) -> Result<()> {
        if !(0. ..1.).contains(&self.momentum_start) || !(0. ..1.).contains(&self.momentum_stable) {
            return Err(DlErr::config("momentum_start", "momentum must be >= 0 and < 1"));
        }

        if self.adaptive_rate {
            if self.momentum_start != 0. || self.momentum_stable != 0. {
                return Err(DlErr::config(
                    "adaptive_rate",
                    "cannot have non-zero momentum and adaptive rate at the same time",
                ));
            }
            if !(self.rho > 0. && self.rho < 1.) {
                return Err(DlErr::config("rho", "rho must be > 0 and < 1 with adaptive rate"));
            }
            if !(self.epsilon > 0.) {
                return Err(DlErr::config("epsilon", "epsilon must be > 0 with adaptive rate"));
            }
        } else {
            if !(self.rate > 0.) {
                return Err(DlErr::config("rate", "rate must be positive"));
            }
            if self.rate_annealing < 0. {
                return Err(DlErr::config("rate_annealing", "rate annealing must be >= 0"));
            }
            if !(self.rate_decay > 0.) {
                return Err(DlErr::config("rate_decay", "rate decay must be positive"));
            }
            if self.momentum_ramp < 0. {
                return Err(DlErr::config("momentum_ramp", "momentum ramp must be >= 0"));
            }
        }

        Ok(())
    }

    fn validate_loss(&self, classification: bool) -> Result<()> {
        if !classification && self.loss == Loss::CrossEntropy {
            return Err(DlErr::config(
                "loss",
                "CrossEntropy loss requires a categorical response",
            ));
        }

        let distribution = self.distribution;
        if classification {
            if !matches!(distribution, Distribution::Auto) && !distribution.is_categorical() {
                return Err(DlErr::config(
                    "distribution",
                    format!("{distribution:?} distribution is not allowed for classification"),
                ));
            }
            return Ok(());
        }

        match distribution {
            Distribution::Bernoulli | Distribution::Multinomial => Err(DlErr::config(
                "distribution",
                format!("{distribution:?} distribution is not allowed for regression"),
            )),
            Distribution::Laplace if !matches!(self.loss, Loss::Absolute | Loss::Automatic) => {
                Err(DlErr::config(
                    "distribution",
                    "only Automatic or Absolute loss is allowed for laplace distribution",
                ))
            }
            Distribution::Huber if !matches!(self.loss, Loss::Huber | Loss::Automatic) => {
                Err(DlErr::config(
                    "distribution",
                    "only Automatic or Huber loss is allowed for huber distribution",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Turns validated user parameters into the fully populated ones the layers train with.
    ///
    /// # Arguments
    /// * `n_classes` - Number of response classes (1 for regression and autoencoders).
    pub fn sanitize(&mut self, n_classes: usize) {
        if self.hidden_dropout_ratios.is_none() {
            let ratio = if self.activation.has_dropout() {
                info!("hidden_dropout_ratios: automatically setting all hidden dropout ratios to 0.5");
                0.5
            } else {
                0.
            };
            self.hidden_dropout_ratios = Some(vec![ratio; self.hidden.len()]);
        }

        if self.adaptive_rate {
            self.rate = 0.;
            self.rate_decay = 0.;
            self.rate_annealing = 0.;
            self.momentum_start = 0.;
            self.momentum_ramp = 0.;
            self.momentum_stable = 0.;
        } else {
            self.rho = 0.;
            self.epsilon = 0.;
        }

        if self.activation.is_rectifier() && self.max_w2.is_none() {
            info!("max_w2: automatically setting max_w2 to 1000 to keep the rectifier in check");
            self.max_w2 = Some(1e3);
        }

        let classification = n_classes > 1 && !self.autoencoder;
        if self.distribution == Distribution::Auto {
            self.distribution = if classification {
                if n_classes == 2 {
                    Distribution::Bernoulli
                } else {
                    Distribution::Multinomial
                }
            } else {
                match self.loss {
                    Loss::Absolute => Distribution::Laplace,
                    Loss::Huber => Distribution::Huber,
                    _ => Distribution::Gaussian,
                }
            };
        }

        if self.loss == Loss::Automatic {
            self.loss = match self.distribution {
                Distribution::Bernoulli | Distribution::Multinomial => Loss::CrossEntropy,
                Distribution::Laplace => Loss::Absolute,
                Distribution::Huber => Loss::Huber,
                _ => Loss::Quadratic,
            };
        }
    }

    /// Dropout ratio of hidden layer `layer` (0 based).
    pub fn hidden_dropout_ratio(&self, layer: usize) -> f64 {
        self.hidden_dropout_ratios
            .as_ref()
            .and_then(|r| r.get(layer).copied())
            .unwrap_or(0.)
    }

    /// The weight clipping threshold, infinite when unbounded.
    pub fn max_w2(&self) -> f32 {
        self.max_w2.unwrap_or(f32::INFINITY)
    }

    /// Whether the manual update rule carries momentum state.
    pub fn has_momenta(&self) -> bool {
        self.momentum_start != 0. || self.momentum_stable != 0.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DeepLearningParams {
        DeepLearningParams {
            seed: 1,
            hidden: vec![4, 4],
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        params().validate(1).unwrap();
        params().validate(3).unwrap();
    }

    #[test]
    fn momentum_with_adaptive_rate() {
        let p = DeepLearningParams {
            momentum_start: 0.5,
            ..params()
        };
        let err = p.validate(1).unwrap_err();
        assert!(matches!(err, DlErr::InvalidConfig { field: "adaptive_rate", .. }));

        let p = DeepLearningParams {
            adaptive_rate: false,
            ..p
        };
        p.validate(1).unwrap();
    }

    #[test]
    fn dropout_ratios() {
        let p = DeepLearningParams {
            activation: Activation::TanhWithDropout,
            hidden_dropout_ratios: Some(vec![0.5]),
            ..params()
        };
        assert!(p.validate(1).is_err());

        let p = DeepLearningParams {
            hidden_dropout_ratios: Some(vec![0.5, 1.]),
            ..p
        };
        assert!(p.validate(1).is_err());

        let p = DeepLearningParams {
            input_dropout_ratio: 1.,
            hidden_dropout_ratios: None,
            ..p
        };
        assert!(p.validate(1).is_err());
    }

    #[test]
    fn loss_and_problem_kind() {
        let p = DeepLearningParams {
            loss: Loss::CrossEntropy,
            ..params()
        };
        assert!(p.validate(1).is_err());
        p.validate(2).unwrap();

        let p = DeepLearningParams {
            distribution: Distribution::Gaussian,
            ..params()
        };
        assert!(p.validate(3).is_err());
    }

    #[test]
    fn sanitize_fills_defaults() {
        let mut p = DeepLearningParams {
            activation: Activation::RectifierWithDropout,
            ..params()
        };
        p.sanitize(3);

        assert_eq!(p.hidden_dropout_ratios, Some(vec![0.5, 0.5]));
        assert_eq!(p.max_w2, Some(1e3));
        assert_eq!(p.distribution, Distribution::Multinomial);
        assert_eq!(p.loss, Loss::CrossEntropy);
        assert_eq!(p.rate, 0.);
    }

    #[test]
    fn sanitize_regression() {
        let mut p = DeepLearningParams {
            activation: Activation::Tanh,
            adaptive_rate: false,
            loss: Loss::Absolute,
            ..params()
        };
        p.sanitize(1);

        assert_eq!(p.hidden_dropout_ratios, Some(vec![0., 0.]));
        assert_eq!(p.max_w2, None);
        assert_eq!(p.distribution, Distribution::Laplace);
        assert_eq!(p.rho, 0.);
    }

    #[test]
    fn sparsity_needs_an_autoencoder() {
        let p = DeepLearningParams {
            sparsity_beta: 0.1,
            average_activation: 0.2,
            ..params()
        };
        let err = p.validate(1).unwrap_err();
        assert!(matches!(err, DlErr::InvalidConfig { field: "sparsity_beta", .. }));

        let auto = DeepLearningParams {
            autoencoder: true,
            activation: Activation::Tanh,
            ..p.clone()
        };
        auto.validate(1).unwrap();
        assert!(auto.has_sparsity());

        let out_of_range = DeepLearningParams {
            average_activation: 1.,
            ..auto.clone()
        };
        let err = out_of_range.validate(1).unwrap_err();
        assert!(matches!(err, DlErr::InvalidConfig { field: "average_activation", .. }));

        let rectifier = DeepLearningParams {
            activation: Activation::Rectifier,
            average_activation: 0.,
            ..auto
        };
        let err = rectifier.validate(1).unwrap_err();
        assert!(matches!(err, DlErr::InvalidConfig { field: "average_activation", .. }));
    }

    #[test]
    fn json_with_defaults() {
        let p: DeepLearningParams =
            serde_json::from_str(r#"{"seed": 3, "hidden": [8], "activation": "tanh_with_dropout"}"#)
                .unwrap();

        assert_eq!(p.hidden, [8]);
        assert_eq!(p.activation, Activation::TanhWithDropout);
        assert!(p.adaptive_rate);
        assert_eq!(p.mini_batch_size, 1);
    }
}
