use ndarray::{ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use super::WildBuf;

/// A dense vector of `f32` values, used for biases, activations, errors and optimizer helpers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenseVector {
    data: WildBuf,
}

impl DenseVector {
    /// Creates a new zeroed `DenseVector` of `size` values.
    pub fn zeros(size: usize) -> Self {
        Self {
            data: WildBuf::zeros(size),
        }
    }

    /// Creates a new `DenseVector` taking ownership of `values`.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self {
            data: WildBuf::from_vec(values),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        self.data.get(i)
    }

    #[inline]
    pub fn set(&self, i: usize, value: f32) {
        self.data.set(i, value)
    }

    #[inline]
    pub fn add(&self, i: usize, delta: f32) {
        self.data.add(i, delta)
    }

    /// The underlying lock-free buffer.
    #[inline]
    pub fn data(&self) -> &WildBuf {
        &self.data
    }

    #[inline]
    pub fn raw(&self) -> &[f32] {
        self.data.as_slice()
    }

    #[inline]
    pub fn raw_mut(&mut self) -> &mut [f32] {
        self.data.as_mut_slice()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        ArrayView1::from(self.raw())
    }

    pub fn view_mut(&mut self) -> ArrayViewMut1<'_, f32> {
        ArrayViewMut1::from(self.raw_mut())
    }

    /// Sets every value to zero.
    pub fn clear(&mut self) {
        self.raw_mut().fill(0.);
    }
}
