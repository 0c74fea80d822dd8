use serde::{Deserialize, Serialize};

use crate::{DlErr, Result};

/// A write-once sparse vector holding only its non zero entries, sorted by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    size: usize,
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl SparseVector {
    /// Scans a dense slice once and keeps its non zero entries.
    ///
    /// # Arguments
    /// * `dense` - The values to compress.
    ///
    /// # Returns
    /// A new `SparseVector` of the same logical size as `dense`.
    pub fn from_dense(dense: &[f32]) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.)
            .map(|(i, v)| (i, *v))
            .unzip();

        Self {
            size: dense.len(),
            indices,
            values,
        }
    }

    /// Builds a sparse vector from already sorted `(index, value)` pairs.
    ///
    /// # Arguments
    /// * `size` - The logical size of the vector.
    /// * `pairs` - The entries, their indices must be strictly increasing and below `size`.
    ///
    /// # Returns
    /// An error if the indices are not strictly increasing or out of range.
    pub fn from_pairs(size: usize, pairs: impl IntoIterator<Item = (usize, f32)>) -> Result<Self> {
        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();

        for (position, w) in indices.windows(2).enumerate() {
            if w[0] >= w[1] {
                return Err(DlErr::UnsortedSparseIndices {
                    position: position + 1,
                });
            }
        }

        if let Some(&last) = indices.last()
            && last >= size
        {
            return Err(DlErr::SizeMismatch {
                what: "sparse vector index",
                got: last,
                expected: size,
            });
        }

        Ok(Self {
            size,
            indices,
            values,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Amount of stored (non zero) entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Looks up the value at `i` with a binary search, missing entries are zero.
    pub fn get(&self, i: usize) -> f32 {
        assert!(i < self.size, "index {i} out of bounds for size {}", self.size);
        match self.indices.binary_search(&i) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.; self.size];
        for (i, v) in self.iter() {
            dense[i] = v;
        }
        dense
    }
}
