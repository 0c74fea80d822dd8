use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::{debug, warn};
use ndarray::{ArrayView2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use crate::{
    DlErr, Result,
    initialization::{self, ConstParamGen, LayerShape, ParamGen},
    optimization::{OptimizerState, UpdateRule},
    params::DeepLearningParams,
    row::DataShape,
    stats::Diagnostics,
    storage::{DenseVector, Matrix},
};

/// Affine transform applied to a numeric response before training, undone when scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseNormalization {
    pub sub: f32,
    pub mul: f32,
}

impl ResponseNormalization {
    pub fn normalize(&self, y: f32) -> f32 {
        (y - self.sub) * self.mul
    }

    pub fn denormalize(&self, y: f32) -> f32 {
        y / self.mul + self.sub
    }
}

/// The complete trainable state of a deep learning model.
///
/// Weights, biases and optimizer helpers are lock-free buffers: any number of threads may update
/// them through a shared reference without coordination. Structural operations (`add`, `mult`,
/// `div`, initialization) need exclusive access.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    model_id: String,
    params: DeepLearningParams,
    rule: UpdateRule,
    shape: DataShape,
    n_classes: usize,
    units: Vec<usize>,
    weights: Vec<Matrix>,
    biases: Vec<DenseVector>,
    /// Running mean activation of every hidden layer, only kept by sparse autoencoders.
    #[serde(default)]
    avg_activations: Vec<DenseVector>,
    optimizer: OptimizerState,
    normalization: Option<ResponseNormalization>,
    processed_global: AtomicU64,
    processed_local: AtomicU64,
    unstable: AtomicBool,
}

impl ModelInfo {
    /// Validates and sanitizes `params` and allocates a zeroed model.
    ///
    /// # Arguments
    /// * `model_id` - Name of the model, used to derive the store keys.
    /// * `params` - The user parameters.
    /// * `shape` - Width of the encoded input.
    /// * `n_classes` - Number of response classes, 1 for regression and autoencoders.
    ///
    /// # Returns
    /// The new model or the first configuration error.
    pub fn new(
        model_id: impl Into<String>,
        mut params: DeepLearningParams,
        shape: DataShape,
        n_classes: usize,
    ) -> Result<Self> {
        params.validate(n_classes)?;
        params.sanitize(n_classes);

        let full = shape.full_width();
        if full == 0 {
            return Err(DlErr::config("shape", "the input has no features"));
        }

        let n_classes = if params.autoencoder { 1 } else { n_classes.max(1) };
        let inputs = shape.nums.saturating_add(params.max_categorical_features).min(full);
        let outputs = if params.autoencoder { inputs } else { n_classes };

        let mut units = Vec::with_capacity(params.hidden.len() + 2);
        units.push(inputs);
        units.extend_from_slice(&params.hidden);
        units.push(outputs);

        let hidden = params.hidden.len();
        let mult = |layer: usize| {
            if layer < hidden { params.activation.width_multiplier() } else { 1 }
        };

        let weights: Vec<_> = (0..=hidden)
            .map(|i| {
                let (rows, cols) = (mult(i) * units[i + 1], units[i]);
                if i == 0 && params.col_major {
                    Matrix::col_major(rows, cols)
                } else {
                    Matrix::row_major(rows, cols)
                }
            })
            .collect();
        let biases: Vec<_> = (0..=hidden)
            .map(|i| DenseVector::zeros(mult(i) * units[i + 1]))
            .collect();
        let avg_activations = if params.has_sparsity() {
            (0..hidden).map(|i| DenseVector::zeros(mult(i) * units[i + 1])).collect()
        } else {
            Vec::new()
        };

        let rule = UpdateRule::from_params(&params);
        let sizes: Vec<_> = weights
            .iter()
            .zip(&biases)
            .map(|(w, b)| (w.size(), b.size()))
            .collect();
        let optimizer = OptimizerState::new(&rule, &sizes);

        Ok(Self {
            model_id: model_id.into(),
            params,
            rule,
            shape,
            n_classes,
            units,
            weights,
            biases,
            avg_activations,
            optimizer,
            normalization: None,
            processed_global: AtomicU64::new(0),
            processed_local: AtomicU64::new(0),
            unstable: AtomicBool::new(false),
        })
    }

    /// Draws the initial weights from the configured distribution and sets the initial biases.
    pub fn initialize(&mut self) -> Result<()> {
        let layers = self.layers();
        let softmax = self.is_classification();

        for (i, w) in self.weights.iter_mut().enumerate() {
            let shape = LayerShape {
                layer: i,
                fan_in: self.units[i],
                fan_out: self.units[i + 1],
                softmax: softmax && i == layers - 1,
            };
            let mut param_gen = initialization::weight_gen(
                self.params.initial_weight_distribution,
                self.params.initial_weight_scale as f32,
                self.params.seed,
                shape,
                w.size(),
            )?;

            let values = param_gen.sample(w.size()).unwrap_or_default();
            let cols = w.cols();
            for (n, v) in values.into_iter().enumerate() {
                w.set(n / cols, n % cols, v);
            }
        }

        let activation = self.params.activation;
        for (i, b) in self.biases.iter_mut().enumerate() {
            ConstParamGen::bias(activation, i, layers, b.size()).fill(b.raw_mut());
        }

        debug!(model = self.model_id.as_str(), size = self.size(); "initialized model weights");
        Ok(())
    }

    /// Initializes this model and then copies the input and hidden layers of a trained
    /// autoencoder. The output layer keeps its fresh random weights.
    ///
    /// # Arguments
    /// * `pretrained` - A trained autoencoder with the same input and hidden layout.
    pub fn initialize_from_pretrained(&mut self, pretrained: &ModelInfo) -> Result<()> {
        if !pretrained.params.autoencoder {
            return Err(DlErr::config(
                "pretrained",
                "the pretrained model must be an autoencoder",
            ));
        }
        if pretrained.layers() != self.layers() {
            return Err(DlErr::SizeMismatch {
                what: "pretrained layers",
                got: pretrained.layers(),
                expected: self.layers(),
            });
        }

        self.initialize()?;

        for i in 0..self.layers() - 1 {
            let (ours, theirs) = (&self.weights[i], &pretrained.weights[i]);
            check_dims(i, "pretrained weight rows", theirs.rows(), ours.rows())?;
            check_dims(i, "pretrained weight columns", theirs.cols(), ours.cols())?;
            check_dims(i, "pretrained biases", pretrained.biases[i].size(), self.biases[i].size())?;

            for row in 0..ours.rows() {
                for col in 0..ours.cols() {
                    ours.set(row, col, theirs.get(row, col));
                }
            }
            self.biases[i]
                .raw_mut()
                .copy_from_slice(pretrained.biases[i].raw());
        }

        Ok(())
    }

    /// Overwrites the weights and biases of layer transition `layer`.
    ///
    /// # Arguments
    /// * `layer` - The weight matrix position, 0 leaves the input layer.
    /// * `weights` - A `[rows x cols]` matrix in logical orientation.
    /// * `biases` - One bias per row.
    pub fn set_initial_weights(
        &mut self,
        layer: usize,
        weights: ArrayView2<f32>,
        biases: &[f32],
    ) -> Result<()> {
        if layer >= self.layers() {
            return Err(DlErr::SizeMismatch {
                what: "layer index",
                got: layer,
                expected: self.layers(),
            });
        }

        let w = &self.weights[layer];
        let (rows, cols) = weights.dim();
        check_dims(layer, "weight rows", rows, w.rows())?;
        check_dims(layer, "weight columns", cols, w.cols())?;
        check_dims(layer, "biases", biases.len(), self.biases[layer].size())?;

        for ((row, col), v) in weights.indexed_iter() {
            w.set(row, col, *v);
        }
        self.biases[layer].raw_mut().copy_from_slice(biases);
        Ok(())
    }

    /// Adds the weights, biases, mean activations and optimizer helpers of `other` into this
    /// model, together with its local sample counter.
    pub fn add(&mut self, other: &ModelInfo) {
        for (mine, theirs) in self.weights.iter_mut().zip(&other.weights) {
            let mut view = ArrayViewMut1::from(mine.raw_mut());
            view += &ndarray::ArrayView1::from(theirs.raw());
        }
        for (mine, theirs) in self.biases.iter_mut().zip(&other.biases) {
            let mut view = mine.view_mut();
            view += &theirs.view();
        }
        for (mine, theirs) in self.avg_activations.iter_mut().zip(&other.avg_activations) {
            let mut view = mine.view_mut();
            view += &theirs.view();
        }
        self.optimizer.add(&other.optimizer);

        let local = other.processed_local();
        self.processed_local.fetch_add(local, Ordering::Relaxed);
    }

    /// Multiplies every weight, bias, mean activation and optimizer helper by `factor`, counters are untouched.
    pub fn mult(&mut self, factor: f32) {
        self.map_inplace(|v| v * factor);
    }

    /// Divides every weight, bias, mean activation and optimizer helper by `n`, counters are untouched.
    pub fn div(&mut self, n: f32) {
        self.map_inplace(|v| v / n);
    }

    fn map_inplace(&mut self, f: impl Fn(f32) -> f32 + Copy) {
        for w in &mut self.weights {
            ArrayViewMut1::from(w.raw_mut()).mapv_inplace(f);
        }
        for b in self.biases.iter_mut().chain(&mut self.avg_activations) {
            b.view_mut().mapv_inplace(f);
        }
        self.optimizer.map_inplace(f);
    }

    /// Computes the per layer diagnostics and flags the model unstable if any layer diverged.
    pub fn compute_stats(&self) -> Diagnostics {
        let diagnostics = Diagnostics::compute(self);
        if diagnostics.unstable && !self.is_unstable() {
            warn!(model = self.model_id.as_str(); "weights or biases diverged, model is unstable");
            self.set_unstable();
        }
        diagnostics
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn params(&self) -> &DeepLearningParams {
        &self.params
    }

    pub fn update_rule(&self) -> &UpdateRule {
        &self.rule
    }

    pub fn shape(&self) -> DataShape {
        self.shape
    }

    /// Number of response classes, 1 for regression and autoencoders.
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn is_classification(&self) -> bool {
        self.n_classes > 1
    }

    /// Width of every layer, input first and output last.
    pub fn units(&self) -> &[usize] {
        &self.units
    }

    /// Number of weight matrices (hidden layers plus one).
    pub fn layers(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self, layer: usize) -> &Matrix {
        &self.weights[layer]
    }

    pub fn biases(&self, layer: usize) -> &DenseVector {
        &self.biases[layer]
    }

    /// Running mean activation of hidden layer `layer`, `None` unless the model is a sparse
    /// autoencoder.
    pub fn avg_activations(&self, layer: usize) -> Option<&DenseVector> {
        self.avg_activations.get(layer)
    }

    pub fn optimizer(&self) -> &OptimizerState {
        &self.optimizer
    }

    /// Total amount of weights and biases.
    pub fn size(&self) -> usize {
        let weights: usize = self.weights.iter().map(Matrix::size).sum();
        let biases: usize = self.biases.iter().map(DenseVector::size).sum();
        weights + biases
    }

    pub fn normalization(&self) -> Option<ResponseNormalization> {
        self.normalization
    }

    pub fn set_normalization(&mut self, normalization: Option<ResponseNormalization>) {
        self.normalization = normalization;
    }

    pub fn processed_global(&self) -> u64 {
        self.processed_global.load(Ordering::Relaxed)
    }

    pub fn set_processed_global(&self, n: u64) {
        self.processed_global.store(n, Ordering::Relaxed);
    }

    pub fn processed_local(&self) -> u64 {
        self.processed_local.load(Ordering::Relaxed)
    }

    pub fn set_processed_local(&self, n: u64) {
        self.processed_local.store(n, Ordering::Relaxed);
    }

    pub fn add_processed_local(&self, n: u64) {
        self.processed_local.fetch_add(n, Ordering::Relaxed);
    }

    /// Samples seen so far: the globally agreed count plus this replica's local progress.
    pub fn processed_total(&self) -> u64 {
        self.processed_global() + self.processed_local()
    }

    pub fn is_unstable(&self) -> bool {
        self.unstable.load(Ordering::Relaxed)
    }

    pub fn set_unstable(&self) {
        self.unstable.store(true, Ordering::Relaxed);
    }

    fn layer_name(&self, layer: usize) -> String {
        if layer == 0 {
            return "Input".to_string();
        }
        if layer < self.units.len() - 1 {
            return format!("{:?}", self.params.activation);
        }
        if self.params.autoencoder || !self.is_classification() {
            "Linear".to_string()
        } else {
            "Softmax".to_string()
        }
    }
}

fn check_dims(layer: usize, what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(DlErr::DimensionMismatch {
            layer,
            what,
            got,
            expected,
        });
    }
    Ok(())
}

impl Clone for ModelInfo {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            params: self.params.clone(),
            rule: self.rule,
            shape: self.shape,
            n_classes: self.n_classes,
            units: self.units.clone(),
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            avg_activations: self.avg_activations.clone(),
            optimizer: self.optimizer.clone(),
            normalization: self.normalization,
            processed_global: AtomicU64::new(self.processed_global()),
            processed_local: AtomicU64::new(self.processed_local()),
            unstable: AtomicBool::new(self.is_unstable()),
        }
    }
}

impl Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnostics = Diagnostics::compute(self);
        let processed = self.processed_total();

        writeln!(
            f,
            "Model {}: {} weights/biases, {} training samples{}",
            self.model_id,
            self.size(),
            processed,
            if self.is_unstable() { " (unstable)" } else { "" }
        )?;
        writeln!(
            f,
            "{:>5} {:>6} {:>22} {:>8} {:>8} {:>8} {:>12} {:>9} {:>12} {:>12} {:>12} {:>12}",
            "layer",
            "units",
            "type",
            "dropout",
            "l1",
            "l2",
            "rate",
            "momentum",
            "mean_weight",
            "rms_weight",
            "mean_bias",
            "rms_bias"
        )?;
        writeln!(
            f,
            "{:>5} {:>6} {:>22} {:>7.2}%",
            1,
            self.units[0],
            self.layer_name(0),
            self.params.input_dropout_ratio * 100.
        )?;

        for (i, stats) in diagnostics.layers.iter().enumerate() {
            let dropout = self.params.hidden_dropout_ratio(i) * 100.;
            let (rate, momentum) = match &self.rule {
                UpdateRule::AdaDelta(_) => (stats.mean_rate.unwrap_or(0.), 0.),
                UpdateRule::Manual(manual) => (
                    manual.rate(i + 1, processed) as f64,
                    manual.momentum(processed) as f64,
                ),
            };

            writeln!(
                f,
                "{:>5} {:>6} {:>22} {:>7.2}% {:>8} {:>8} {:>12.6} {:>9.4} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                i + 2,
                self.units[i + 1],
                self.layer_name(i + 1),
                if i + 1 < self.layers() { dropout } else { 0. },
                self.params.l1,
                self.params.l2,
                rate,
                momentum,
                stats.mean_weight,
                stats.rms_weight,
                stats.mean_bias,
                stats.rms_bias
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::params::Activation;

    fn params() -> DeepLearningParams {
        DeepLearningParams {
            seed: 42,
            hidden: vec![3],
            activation: Activation::Tanh,
            ..Default::default()
        }
    }

    #[test]
    fn layout() {
        let model = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        assert_eq!(model.units(), [2, 3, 1]);
        assert_eq!(model.layers(), 2);
        assert_eq!(model.weights(0).rows(), 3);
        assert_eq!(model.weights(0).cols(), 2);
        assert_eq!(model.size(), 6 + 3 + 3 + 1);
    }

    #[test]
    fn maxout_doubles_hidden_rows() {
        let p = DeepLearningParams {
            activation: Activation::Maxout,
            ..params()
        };
        let model = ModelInfo::new("m", p, DataShape::numeric(2), 3).unwrap();
        assert_eq!(model.weights(0).rows(), 6);
        assert_eq!(model.biases(0).size(), 6);
        assert_eq!(model.weights(1).rows(), 3);
    }

    #[test]
    fn categorical_cap() {
        let p = DeepLearningParams {
            max_categorical_features: 4,
            ..params()
        };
        let shape = DataShape {
            cat_width: 100,
            nums: 2,
        };
        let model = ModelInfo::new("m", p, shape, 1).unwrap();
        assert_eq!(model.units()[0], 6);
    }

    #[test]
    fn initial_biases() {
        let p = DeepLearningParams {
            activation: Activation::Rectifier,
            hidden: vec![2, 2],
            ..params()
        };
        let mut model = ModelInfo::new("m", p, DataShape::numeric(2), 1).unwrap();
        model.initialize().unwrap();

        assert_eq!(model.biases(0).raw(), [0.5, 0.5]);
        assert_eq!(model.biases(1).raw(), [1., 1.]);
        assert_eq!(model.biases(2).raw(), [0.]);
        assert!(model.weights(0).raw().iter().any(|w| *w != 0.));
    }

    #[test]
    fn same_seed_same_weights() {
        let mut a = ModelInfo::new("a", params(), DataShape::numeric(2), 1).unwrap();
        let mut b = ModelInfo::new("b", params(), DataShape::numeric(2), 1).unwrap();
        a.initialize().unwrap();
        b.initialize().unwrap();
        assert_eq!(a.weights(0).raw(), b.weights(0).raw());
    }

    #[test]
    fn set_initial_weights_checks_dims() {
        let mut model = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();

        let err = model
            .set_initial_weights(0, array![[1., 2.]].view(), &[0., 0., 0.])
            .unwrap_err();
        assert!(matches!(err, DlErr::DimensionMismatch { layer: 0, .. }));

        model
            .set_initial_weights(1, array![[1., 2., 3.]].view(), &[0.5])
            .unwrap();
        assert_eq!(model.weights(1).raw(), [1., 2., 3.]);
        assert_eq!(model.biases(1).raw(), [0.5]);
    }

    #[test]
    fn add_mult_div() {
        let mut a = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        let b = a.clone();
        b.weights(1).set(0, 0, 4.);
        b.biases(1).set(0, 2.);
        b.set_processed_local(10);
        b.set_processed_global(99);

        a.add(&b);
        a.add(&b);
        assert_eq!(a.weights(1).get(0, 0), 8.);
        assert_eq!(a.processed_local(), 20);
        assert_eq!(a.processed_global(), 0);

        a.div(4.);
        assert_eq!(a.weights(1).get(0, 0), 2.);
        a.mult(0.5);
        assert_eq!(a.biases(1).get(0), 0.5);
        assert_eq!(a.processed_local(), 20);
    }

    #[test]
    fn sparse_autoencoders_average_their_mean_activations() {
        let p = DeepLearningParams {
            autoencoder: true,
            activation: Activation::Tanh,
            hidden: vec![3, 2],
            sparsity_beta: 0.5,
            average_activation: 0.1,
            ..params()
        };
        let mut a = ModelInfo::new("ae", p, DataShape::numeric(2), 1).unwrap();
        assert_eq!(a.avg_activations(0).unwrap().size(), 3);
        assert_eq!(a.avg_activations(1).unwrap().size(), 2);
        assert!(a.avg_activations(2).is_none());

        let b = a.clone();
        b.avg_activations(0).unwrap().set(1, 0.6);
        a.add(&b);
        a.add(&b);
        a.div(3.);
        assert!((a.avg_activations(0).unwrap().get(1) - 0.4).abs() < 1e-6);

        let plain = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        assert!(plain.avg_activations(0).is_none());
    }

    #[test]
    fn stats_flag_unstable() {
        let model = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        assert!(!model.compute_stats().unstable);

        model.biases(0).set(0, f32::NAN);
        assert!(model.compute_stats().unstable);
        assert!(model.is_unstable());
    }

    #[test]
    fn serde_keeps_counters() {
        let model = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        model.set_processed_global(7);
        model.weights(0).set(1, 1, 0.25);

        let json = serde_json::to_string(&model).unwrap();
        let back: ModelInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.processed_global(), 7);
        assert_eq!(back.weights(0).get(1, 1), 0.25);
        assert_eq!(back.units(), model.units());
    }

    #[test]
    fn summary_lists_every_layer() {
        let model = ModelInfo::new("m", params(), DataShape::numeric(2), 1).unwrap();
        let summary = model.to_string();
        assert!(summary.contains("Input"));
        assert!(summary.contains("Tanh"));
        assert!(summary.contains("Linear"));
    }
}
