mod activation;
mod backprop;
mod input;
mod ops;

pub use input::Input;

use crate::{
    ModelInfo,
    dropout::Dropout,
    storage::{DenseVector, SparseVector},
};

/// What a non input layer computes after its affine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeuronKind {
    Tanh,
    Rectifier,
    Maxout,
    Softmax,
    Linear,
}

/// The activations flowing into a layer.
#[derive(Debug, Clone, Copy)]
pub enum Activations<'a> {
    Dense(&'a [f32]),
    Sparse(&'a SparseVector),
}

impl Activations<'_> {
    pub fn len(&self) -> usize {
        match self {
            Activations::Dense(a) => a.len(),
            Activations::Sparse(a) => a.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        match self {
            Activations::Dense(a) => a[i],
            Activations::Sparse(a) => a.get(i),
        }
    }

    /// Calls `f` with every non zero `(index, value)` pair, in index order.
    pub fn for_each_nonzero(&self, mut f: impl FnMut(usize, f32)) {
        match self {
            Activations::Dense(a) => a
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.)
                .for_each(|(i, v)| f(i, *v)),
            Activations::Sparse(a) => a.iter().for_each(|(i, v)| f(i, v)),
        }
    }
}

/// The layer below the one being back propagated: its activations and, unless it is the input
/// layer, the error vector to accumulate into.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Previous<'a> {
    pub a: Activations<'a>,
    pub e: Option<&'a DenseVector>,
}

/// A hidden or output layer bound to the model it reads and updates.
///
/// Owns its per row scratch state (activations, errors, dropout mask and maxout winners) while
/// the weights stay in the shared `ModelInfo`, so many `Neurons` on different threads can train
/// the same model at once.
#[derive(Debug)]
pub struct Neurons<'m> {
    kind: NeuronKind,
    /// Position of the weight matrix feeding this layer.
    index: usize,
    model: &'m ModelInfo,
    consensus: Option<&'m ModelInfo>,
    training: bool,
    a: DenseVector,
    e: DenseVector,
    dropout: Option<Dropout>,
    dropout_ratio: f64,
    max_incoming: Vec<usize>,
    /// Running mean activation of this layer, pulled towards the target by sparse autoencoders.
    avg_a: Option<&'m DenseVector>,
}

impl<'m> Neurons<'m> {
    /// Creates a new layer.
    ///
    /// # Arguments
    /// * `kind` - What the layer computes.
    /// * `index` - Position of the weight matrix feeding it, 0 for the first hidden layer.
    /// * `model` - The model holding the weights.
    /// * `training` - Training layers sample dropout masks, scoring layers scale by the
    ///   keep probability instead.
    ///
    /// # Returns
    /// A new `Neurons` instance.
    pub fn new(kind: NeuronKind, index: usize, model: &'m ModelInfo, training: bool) -> Self {
        let params = model.params();
        let units = model.units()[index + 1];

        let hidden = index + 1 < model.layers();
        let dropout_ratio = if hidden && params.activation.has_dropout() {
            params.hidden_dropout_ratio(index)
        } else {
            0.
        };
        let dropout = (training && hidden && params.activation.has_dropout())
            .then(|| Dropout::new(units, dropout_ratio));

        let max_incoming = if kind == NeuronKind::Maxout {
            vec![0; units]
        } else {
            Vec::new()
        };

        Self {
            kind,
            index,
            model,
            consensus: None,
            training,
            a: DenseVector::zeros(units),
            e: DenseVector::zeros(units),
            dropout,
            dropout_ratio,
            max_incoming,
            avg_a: if hidden { model.avg_activations(index) } else { None },
        }
    }

    /// Regularizes every update towards `consensus`, the cluster wide elastic average.
    pub fn set_consensus(&mut self, consensus: &'m ModelInfo) {
        self.consensus = Some(consensus);
    }

    pub fn kind(&self) -> NeuronKind {
        self.kind
    }

    pub fn units(&self) -> usize {
        self.a.size()
    }

    pub fn activations(&self) -> &[f32] {
        self.a.raw()
    }

    pub fn errors(&self) -> &[f32] {
        self.e.raw()
    }

    /// Winning channel of every maxout unit in the last forward pass.
    pub fn max_incoming(&self) -> &[usize] {
        &self.max_incoming
    }

    pub fn dropout(&self) -> Option<&Dropout> {
        self.dropout.as_ref()
    }

    pub(crate) fn set_error(&self, unit: usize, value: f32) {
        self.e.set(unit, value);
    }

    pub(crate) fn clear_errors(&mut self) {
        self.e.clear();
    }

    pub(crate) fn as_previous(&self) -> Previous<'_> {
        Previous {
            a: Activations::Dense(self.a.raw()),
            e: Some(&self.e),
        }
    }

    /// Forward propagates `x` through this layer.
    ///
    /// # Arguments
    /// * `x` - The incoming activations.
    /// * `seed` - The row seed, mixed with the model seed and the activation salt to draw the
    ///   dropout mask.
    /// * `new_mask` - Whether to draw a new dropout mask or keep the previous one.
    pub fn fprop(&mut self, x: Activations, seed: u64, new_mask: bool) {
        let params = self.model.params();

        if new_mask && let Some(dropout) = &mut self.dropout {
            let salt = params.activation.dropout_salt();
            dropout.fill_bytes(seed.wrapping_add(params.seed).wrapping_add(salt));
        }

        let w = self.model.weights(self.index);
        let b = self.model.biases(self.index).raw();
        let dropout = self.dropout.as_ref();
        let a = self.a.raw_mut();

        match self.kind {
            NeuronKind::Tanh => {
                ops::gemv(a, w, x, b, dropout);
                activation::tanh(a);
            }
            NeuronKind::Rectifier => {
                ops::gemv(a, w, x, b, dropout);
                activation::rectifier(a);
            }
            NeuronKind::Maxout => {
                ops::maxout(a, &mut self.max_incoming, w, x, b, dropout);
                activation::max_norm(a);
            }
            NeuronKind::Softmax => {
                ops::gemv(a, w, x, b, None);
                if !activation::softmax(a) {
                    self.model.set_unstable();
                }
            }
            NeuronKind::Linear => ops::gemv(a, w, x, b, None),
        }

        if self.training && let Some(avg_a) = self.avg_a {
            for (unit, &v) in a.iter().enumerate() {
                avg_a.set(unit, 0.999 * avg_a.get(unit) + 0.001 * v);
            }
        }

        if !self.training && self.dropout_ratio > 0. {
            let keep = (1. - self.dropout_ratio) as f32;
            a.iter_mut().for_each(|v| *v *= keep);
        }
    }
}
