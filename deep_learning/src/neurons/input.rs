use super::Activations;
use crate::{
    ModelInfo,
    dropout::{self, Dropout},
    row::{DataShape, Features, Row},
    storage::{DenseVector, SparseVector},
};

/// Maps a categorical level onto one of the capped categorical slots.
fn hash_level(level: usize, seed: u64) -> u64 {
    let mut h = level as u64 ^ seed;
    h = (h ^ (h >> 33)).wrapping_mul(0xff51afd7ed558ccd);
    h = (h ^ (h >> 33)).wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^ (h >> 33)
}

/// The input layer: expands a row into one-hot categoricals followed by the numeric columns.
///
/// When the model caps the categorical width, levels are hashed into the available slots and
/// the numeric columns follow right after them.
#[derive(Debug)]
pub struct Input {
    shape: DataShape,
    /// Categorical slots after hashing, `None` keeps the full one-hot width.
    hashed: Option<usize>,
    seed: u64,
    a: DenseVector,
    /// Pre dropout copy of the activations, kept for autoencoders.
    original: Option<Vec<f32>>,
    sparse: Option<SparseVector>,
    dropout: Option<Dropout>,
}

impl Input {
    pub fn new(model: &ModelInfo, training: bool) -> Self {
        let params = model.params();
        let shape = model.shape();
        let units = model.units()[0];

        let hashed = (units < shape.full_width()).then(|| units - shape.nums.min(units));
        let dropout = (training && params.input_dropout_ratio > 0.)
            .then(|| Dropout::new(units, params.input_dropout_ratio));

        Self {
            shape,
            hashed,
            seed: params.seed,
            a: DenseVector::zeros(units),
            original: params.autoencoder.then(|| vec![0.; units]),
            sparse: params.sparse.then(SparseVector::default),
            dropout,
        }
    }

    pub fn units(&self) -> usize {
        self.a.size()
    }

    /// Loads `row` into the activations and applies input dropout.
    ///
    /// # Arguments
    /// * `seed` - The row seed, mixed with the model seed for the dropout draw.
    /// * `row` - The row to encode, missing numeric values become 0.
    pub fn set_input(&mut self, seed: u64, row: &Row) {
        self.a.clear();
        let a = self.a.raw_mut();

        let num_start = match self.hashed {
            Some(slots) => {
                if slots > 0 {
                    for &level in &row.cats {
                        a[(hash_level(level, self.seed) % slots as u64) as usize] = 1.;
                    }
                }
                slots
            }
            None => {
                for &level in &row.cats {
                    if level < self.shape.cat_width {
                        a[level] = 1.;
                    }
                }
                self.shape.num_start()
            }
        };

        let nums = &mut a[num_start..];
        match &row.nums {
            Features::Dense(values) => {
                for (v, x) in nums.iter_mut().zip(values) {
                    *v = if x.is_nan() { 0. } else { *x };
                }
            }
            Features::Sparse(pairs) => {
                for &(i, x) in pairs {
                    if let Some(v) = nums.get_mut(i)
                        && !x.is_nan()
                    {
                        *v = x;
                    }
                }
            }
        }

        if let Some(original) = &mut self.original {
            original.copy_from_slice(a);
        }
        if let Some(dropout) = &self.dropout {
            let seed = seed.wrapping_add(self.seed).wrapping_add(dropout::INPUT_SALT);
            dropout.randomly_sparsify(a, seed);
        }
        if self.sparse.is_some() {
            self.sparse = Some(SparseVector::from_dense(a));
        }
    }

    pub fn activations(&self) -> Activations<'_> {
        match &self.sparse {
            Some(sparse) => Activations::Sparse(sparse),
            None => Activations::Dense(self.a.raw()),
        }
    }

    /// The encoded row before input dropout.
    pub fn original(&self) -> &[f32] {
        self.original.as_deref().unwrap_or(self.a.raw())
    }
}
