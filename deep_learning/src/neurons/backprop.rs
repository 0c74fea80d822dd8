use super::{NeuronKind, Neurons, Previous, ops};
use crate::{
    optimization::{AdaDelta, LayerState, UpdateRule, momentum},
    storage::WildBuf,
};

/// How a single parameter moves once its negative gradient is known.
#[derive(Clone, Copy)]
enum Step<'a> {
    Manual {
        momenta: Option<&'a WildBuf>,
        rate: f32,
        momentum: f32,
        nesterov: bool,
    },
    AdaDelta {
        acc: &'a WildBuf,
        rule: AdaDelta,
    },
}

impl Step<'_> {
    /// Moves `params[i]` along `grad`; AdaDelta folds `grad2` into its accumulators.
    #[inline]
    fn apply(&self, params: &WildBuf, i: usize, grad: f64, grad2: f64) {
        match *self {
            Step::Manual {
                momenta,
                rate,
                momentum,
                nesterov,
            } => momentum::step(params, momenta, i, grad, rate, momentum, nesterov),
            Step::AdaDelta { acc, rule } => {
                let rate = rule.rate(acc, i, grad2);
                params.add(i, (rate as f64 * grad) as f32);
            }
        }
    }
}

#[inline]
fn sign(x: f64) -> f64 {
    if x > 0. {
        1.
    } else if x < 0. {
        -1.
    } else {
        0.
    }
}

impl Neurons<'_> {
    /// Back propagates the error vector of this layer, updating its incoming weights and
    /// biases in place and accumulating the error of the layer below into `prev.e`.
    ///
    /// Units dropped by the current mask are skipped entirely.
    pub(crate) fn bprop(&self, prev: &Previous) {
        let (rate, momentum) = self.rate_and_momentum();

        for row in 0..self.units() {
            if let Some(dropout) = &self.dropout
                && !dropout.unit_active(row)
            {
                continue;
            }

            let a = self.a.get(row) as f64;
            let e = self.e.get(row) as f64;
            let g = match self.kind {
                NeuronKind::Tanh => e * (1. - a * a),
                NeuronKind::Rectifier if a > 0. => e,
                NeuronKind::Rectifier => 0.,
                NeuronKind::Maxout | NeuronKind::Softmax | NeuronKind::Linear => e,
            };

            self.bprop_row(row, g, rate, momentum, prev);
        }
    }

    /// Learning rate and momentum of this layer for the model's current sample count.
    ///
    /// The manual rate is scaled by `1 - momentum` so the effective step size stays constant
    /// while the momentum ramps up.
    fn rate_and_momentum(&self) -> (f32, f32) {
        match self.model.update_rule() {
            UpdateRule::AdaDelta(_) => (0., 0.),
            UpdateRule::Manual(manual) => {
                let processed = self.model.processed_total();
                let m = manual.momentum(processed);
                (manual.rate(self.index + 1, processed) * (1. - m), m)
            }
        }
    }

    /// Whether a zero gradient leaves every parameter of a row unchanged.
    fn shortcut(&self) -> bool {
        let params = self.model.params();
        if self.avg_a.is_some() {
            return false;
        }
        params.fast_mode
            || (matches!(self.model.update_rule(), UpdateRule::Manual(_))
                && !self.model.optimizer().has_momenta()
                && params.l1 == 0.
                && params.l2 == 0.)
    }

    fn steps(&self, rate: f32, momentum: f32) -> (Step<'_>, Step<'_>) {
        let nesterov = self.model.params().nesterov_accelerated_gradient;
        let manual = |momenta| Step::Manual {
            momenta,
            rate,
            momentum,
            nesterov,
        };

        match (self.model.optimizer().layer(self.index), self.model.update_rule()) {
            (LayerState::AdaDelta { weights, biases }, UpdateRule::AdaDelta(rule)) => (
                Step::AdaDelta { acc: weights, rule: *rule },
                Step::AdaDelta { acc: biases, rule: *rule },
            ),
            (LayerState::Momentum { weights, biases }, _) => {
                (manual(Some(weights)), manual(Some(biases)))
            }
            _ => (manual(None), manual(None)),
        }
    }

    #[inline]
    fn weight_index(&self, row: usize, col: usize, cols: usize) -> usize {
        match self.kind {
            NeuronKind::Maxout => 2 * (row * cols + col) + self.max_incoming[row],
            _ => self.model.weights(self.index).index(row, col),
        }
    }

    /// Updates the incoming weights and the bias of unit `row` given its gradient `g`.
    fn bprop_row(&self, row: usize, g: f64, rate: f32, momentum: f32, prev: &Previous) {
        if g == 0. && self.shortcut() {
            return;
        }

        let params = self.model.params();
        let (l1, l2) = (params.l1, params.l2);
        let reg = params.elastic_averaging_regularization;
        let (weight_step, bias_step) = self.steps(rate, momentum);

        let w = self.model.weights(self.index).data();
        let w_ea = self.consensus.map(|c| c.weights(self.index).data());
        let cols = prev.a.len();
        let mut avg_grad2 = 0.;

        let mut update = |col: usize, prev_a: f32| {
            let i = self.weight_index(row, col, cols);
            let weight = w.get(i) as f64;

            if let Some(e) = prev.e {
                e.add(col, (g * weight) as f32);
            }
            if params.fast_mode && prev_a == 0. {
                return;
            }

            let mut grad = g * prev_a as f64 - sign(weight) * l1 - weight * l2;
            if let Some(w_ea) = w_ea {
                grad -= reg * (weight - w_ea.get(i) as f64);
            }

            let grad2 = grad * grad;
            avg_grad2 += grad2;
            weight_step.apply(w, i, grad, grad2);
        };

        // Without an error to propagate, fast mode only needs the non zero inputs.
        if params.fast_mode && prev.e.is_none() {
            prev.a.for_each_nonzero(&mut update);
        } else {
            for col in 0..cols {
                update(col, prev.a.get(col));
            }
        }

        let max_w2 = params.max_w2();
        if max_w2.is_finite() {
            let indices = (0..cols).map(|col| self.weight_index(row, col, cols));
            ops::rescale_row(w, indices, max_w2);
        }

        let b = self.model.biases(self.index).data();
        let bi = match self.kind {
            NeuronKind::Maxout => 2 * row + self.max_incoming[row],
            _ => row,
        };
        let bias = b.get(bi) as f64;

        let mut grad = g - (sign(bias) * l1 + bias * l2);
        if let Some(consensus) = self.consensus {
            grad -= reg * (bias - consensus.biases(self.index).get(bi) as f64);
        }
        if let Some(avg_a) = self.avg_a {
            grad -= params.sparsity_beta * (avg_a.get(bi) as f64 - params.average_activation);
        }
        bias_step.apply(b, bi, grad, avg_grad2 / cols.max(1) as f64);

        if !b.get(bi).is_finite() {
            self.model.set_unstable();
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{
        DataShape, ModelInfo,
        neurons::Activations,
        params::{Activation, DeepLearningParams},
    };

    fn linear_model(params: DeepLearningParams) -> ModelInfo {
        let params = DeepLearningParams {
            seed: 1,
            activation: Activation::Tanh,
            hidden: vec![1],
            adaptive_rate: false,
            rate: 0.5,
            rate_annealing: 0.,
            fast_mode: false,
            ..params
        };
        let mut model = ModelInfo::new("m", params, DataShape::numeric(2), 1).unwrap();
        model.set_initial_weights(0, array![[0., 0.]].view(), &[0.]).unwrap();
        model.set_initial_weights(1, array![[1.]].view(), &[0.]).unwrap();
        model
    }

    fn output_step(model: &ModelInfo, x: [f32; 1], error: f32) {
        let layer = Neurons::new(NeuronKind::Linear, 1, model, true);
        layer.set_error(0, error);
        let prev = Previous {
            a: Activations::Dense(&x),
            e: None,
        };
        layer.bprop(&prev);
    }

    #[test]
    fn plain_step() {
        let model = linear_model(DeepLearningParams::default());
        output_step(&model, [2.], 0.25);

        // w += rate * e * a, b += rate * e
        assert_eq!(model.weights(1).get(0, 0), 1. + 0.5 * 0.25 * 2.);
        assert_eq!(model.biases(1).get(0), 0.5 * 0.25);
    }

    #[test]
    fn l2_decays_without_gradient() {
        let model = linear_model(DeepLearningParams {
            l2: 0.5,
            ..Default::default()
        });
        output_step(&model, [0.], 0.);

        assert_eq!(model.weights(1).get(0, 0), 1. - 0.5 * 0.5);
    }

    #[test]
    fn zero_gradient_shortcut() {
        let plain = linear_model(DeepLearningParams::default());
        output_step(&plain, [1.], 0.);
        assert_eq!(plain.weights(1).get(0, 0), 1.);
        assert_eq!(plain.biases(1).get(0), 0.);

        let decayed = linear_model(DeepLearningParams {
            l2: 0.5,
            ..Default::default()
        });
        output_step(&decayed, [1.], 0.);
        assert!(decayed.weights(1).get(0, 0) < 1.);
    }

    #[test]
    fn errors_flow_to_the_previous_layer() {
        let model = linear_model(DeepLearningParams::default());
        let layer = Neurons::new(NeuronKind::Linear, 1, &model, true);
        layer.set_error(0, 2.);

        let below = Neurons::new(NeuronKind::Tanh, 0, &model, true);
        layer.bprop(&below.as_previous());

        // e_prev = g * w before the update.
        assert_eq!(below.errors(), [2.]);
    }

    #[test]
    fn max_w2_caps_incoming_weights() {
        let model = linear_model(DeepLearningParams {
            max_w2: Some(1.),
            ..Default::default()
        });
        output_step(&model, [10.], 1.);

        let w = model.weights(1).get(0, 0);
        assert!(w * w <= 1. + 1e-6);
    }

    #[test]
    fn sparsity_pulls_hidden_biases_towards_the_target() {
        let params = DeepLearningParams {
            seed: 1,
            activation: Activation::Tanh,
            hidden: vec![1],
            adaptive_rate: false,
            rate: 0.5,
            rate_annealing: 0.,
            fast_mode: false,
            autoencoder: true,
            sparsity_beta: 0.5,
            average_activation: 0.1,
            ..Default::default()
        };
        let model = ModelInfo::new("ae", params, DataShape::numeric(2), 1).unwrap();
        model.avg_activations(0).unwrap().set(0, 0.5);

        let hidden = Neurons::new(NeuronKind::Tanh, 0, &model, true);
        let prev = Previous {
            a: Activations::Dense(&[1., 1.]),
            e: None,
        };
        hidden.bprop(&prev);

        // b -= rate * beta * (avg_a - average_activation), even without an error.
        assert!((model.biases(0).get(0) - -0.5 * 0.5 * 0.4).abs() < 1e-6);
        assert_eq!(model.weights(0).raw(), [0., 0.]);
        assert_eq!(model.biases(1).raw(), [0., 0.]);
    }

    #[test]
    fn infinite_bias_marks_unstable() {
        let model = linear_model(DeepLearningParams::default());
        output_step(&model, [0.], f32::MAX);
        output_step(&model, [0.], f32::MAX);
        output_step(&model, [0.], f32::MAX);
        assert!(model.is_unstable());
    }
}
