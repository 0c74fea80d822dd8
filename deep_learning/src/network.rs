use crate::{
    DlErr, ModelInfo, Result,
    neurons::{Activations, Input, NeuronKind, Neurons, Previous},
    row::Row,
};

/// A stack of layers bound to a model, used to train or score one row at a time.
///
/// Building a network is cheap: it only allocates the per row scratch buffers. Each training
/// thread builds its own network over the shared model and updates it in place.
#[derive(Debug)]
pub struct Network<'m> {
    model: &'m ModelInfo,
    input: Input,
    layers: Vec<Neurons<'m>>,
}

impl<'m> Network<'m> {
    /// Creates a new network over `model`.
    ///
    /// # Arguments
    /// * `model` - The model to read and update.
    /// * `training` - Whether to sample dropout masks, scoring networks scale instead.
    ///
    /// # Returns
    /// A new `Network` instance.
    pub fn new(model: &'m ModelInfo, training: bool) -> Self {
        let activation = model.params().activation;
        let hidden = if activation.is_tanh() {
            NeuronKind::Tanh
        } else if activation.is_rectifier() {
            NeuronKind::Rectifier
        } else {
            NeuronKind::Maxout
        };
        let output = if model.is_classification() {
            NeuronKind::Softmax
        } else {
            NeuronKind::Linear
        };

        let n = model.layers();
        let layers = (0..n)
            .map(|i| {
                let kind = if i + 1 < n { hidden } else { output };
                Neurons::new(kind, i, model, training)
            })
            .collect();

        Self {
            model,
            input: Input::new(model, training),
            layers,
        }
    }

    /// Pulls every update towards `consensus` with the elastic averaging regularization.
    pub fn with_consensus(mut self, consensus: &'m ModelInfo) -> Self {
        for layer in &mut self.layers {
            layer.set_consensus(consensus);
        }
        self
    }

    pub fn model(&self) -> &'m ModelInfo {
        self.model
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn layers(&self) -> &[Neurons<'m>] {
        &self.layers
    }

    /// The activations of the output layer after the last forward pass.
    pub fn output(&self) -> &[f32] {
        self.layers.last().map(Neurons::activations).unwrap_or_default()
    }

    /// Forward propagates `row` through every layer.
    ///
    /// # Arguments
    /// * `seed` - The row seed for the dropout draws.
    /// * `row` - The row to propagate.
    /// * `new_mask` - Whether hidden layers draw a new dropout mask.
    pub fn fprop(&mut self, seed: u64, row: &Row, new_mask: bool) {
        self.input.set_input(seed, row);

        for i in 0..self.layers.len() {
            let (below, rest) = self.layers.split_at_mut(i);
            let x = match below.last() {
                Some(prev) => Activations::Dense(prev.activations()),
                None => self.input.activations(),
            };
            rest[0].fprop(x, seed, new_mask);
        }
    }

    /// Writes the output layer's error for `row`, scaled by the row weight.
    pub fn set_output_gradient(&mut self, row: &Row) {
        let Some(out) = self.layers.last() else {
            return;
        };

        let params = self.model.params();
        let weight = row.weight as f64;
        let y = out.activations();

        match out.kind() {
            NeuronKind::Softmax => {
                let target = row.response as usize;
                for (unit, &y) in y.iter().enumerate() {
                    let t = if unit == target { 1. } else { 0. };
                    let g = params.loss.softmax_gradient(t, y as f64);
                    out.set_error(unit, (g * weight) as f32);
                }
            }
            _ if params.autoencoder => {
                let x = self.input.original();
                for (unit, (&t, &y)) in x.iter().zip(y).enumerate() {
                    let g = params
                        .distribution
                        .negative_gradient(t as f64, y as f64, params.huber_delta);
                    out.set_error(unit, (g * weight) as f32);
                }
            }
            _ => {
                let t = match self.model.normalization() {
                    Some(norm) => norm.normalize(row.response),
                    None => row.response,
                };
                let f = y[0] as f64 + row.offset as f64;
                let g = params
                    .distribution
                    .negative_gradient(t as f64, f, params.huber_delta);
                out.set_error(0, (g * weight) as f32);
            }
        }
    }

    /// Back propagates the output error through every layer, updating the model in place.
    pub fn bprop(&mut self) {
        let n = self.layers.len();
        for layer in self.layers.iter_mut().take(n.saturating_sub(1)) {
            layer.clear_errors();
        }

        for i in (0..n).rev() {
            let prev = match i {
                0 => Previous {
                    a: self.input.activations(),
                    e: None,
                },
                _ => self.layers[i - 1].as_previous(),
            };
            self.layers[i].bprop(&prev);
        }
    }

    /// Whether `row` can be trained on: it needs a positive weight and, unless this is an
    /// autoencoder, a valid response.
    pub fn is_trainable(&self, row: &Row) -> bool {
        if !(row.weight > 0.) {
            return false;
        }
        if self.model.params().autoencoder {
            return true;
        }
        if row.response.is_nan() {
            return false;
        }
        !self.model.is_classification()
            || (row.response >= 0. && (row.response as usize) < self.model.n_classes())
    }

    /// Runs one full training step on `row`.
    ///
    /// # Returns
    /// Whether the row was trained on, rows without weight or response are skipped.
    pub fn train_row(&mut self, seed: u64, row: &Row, new_mask: bool) -> bool {
        if !self.is_trainable(row) {
            return false;
        }

        self.fprop(seed, row, new_mask);
        self.set_output_gradient(row);
        self.bprop();
        true
    }

    /// Scores `row`.
    ///
    /// # Returns
    /// Class probabilities for classification, the reconstruction for autoencoders and the
    /// de-normalized prediction plus offset for regression. Fails if the model is unstable.
    pub fn predict(&mut self, row: &Row) -> Result<Vec<f32>> {
        if self.model.is_unstable() {
            return Err(DlErr::Unstable);
        }

        self.fprop(0, row, true);
        let out = self.output();

        if self.model.is_classification() || self.model.params().autoencoder {
            return Ok(out.to_vec());
        }

        let y = out.first().copied().unwrap_or_default() + row.offset;
        let y = match self.model.normalization() {
            Some(norm) => norm.denormalize(y),
            None => y,
        };
        Ok(vec![y])
    }

    /// Mean squared reconstruction error of `row`, for autoencoders.
    pub fn reconstruction_error(&mut self, row: &Row) -> Result<f64> {
        let reconstruction = self.predict(row)?;
        let x = self.input.original();
        let se: f64 = x
            .iter()
            .zip(&reconstruction)
            .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
            .sum();
        Ok(se / x.len().max(1) as f64)
    }
}
