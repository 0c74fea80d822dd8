use std::ops::Range;

use deep_learning::{DataShape, Features, ResponseNormalization, Row};
use serde::{Deserialize, Serialize};

use super::RowSource;
use crate::{Result, TrainErr};

/// Rows held in memory, split into chunks of `chunk_size` rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryFrame {
    shape: DataShape,
    rows: Vec<Row>,
    chunk_size: usize,
}

impl InMemoryFrame {
    /// Creates a new `InMemoryFrame`.
    ///
    /// # Arguments
    /// * `shape` - Width of the encoded rows.
    /// * `rows` - The rows.
    /// * `chunk_size` - Rows per chunk.
    ///
    /// # Returns
    /// An error if the chunk size is 0 or a row doesn't match `shape`.
    pub fn new(shape: DataShape, rows: Vec<Row>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(TrainErr::InvalidConfig("chunk size must be positive".into()));
        }

        for (i, row) in rows.iter().enumerate() {
            if let Some(&level) = row.cats.iter().find(|&&c| c >= shape.cat_width) {
                return Err(TrainErr::InvalidConfig(format!(
                    "row {i}: categorical level {level} out of range for width {}",
                    shape.cat_width
                )));
            }

            let width_ok = match &row.nums {
                Features::Dense(values) => values.len() == shape.nums,
                Features::Sparse(pairs) => {
                    pairs.windows(2).all(|w| w[0].0 < w[1].0)
                        && pairs.last().is_none_or(|(i, _)| *i < shape.nums)
                }
            };
            if !width_ok {
                return Err(TrainErr::InvalidConfig(format!(
                    "row {i}: numeric features don't match {} columns",
                    shape.nums
                )));
            }
        }

        Ok(Self {
            shape,
            rows,
            chunk_size,
        })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Standardization of the response to zero mean and unit variance.
    ///
    /// # Returns
    /// `None` without rows carrying a response or with a constant response.
    pub fn response_normalization(&self) -> Option<ResponseNormalization> {
        let responses: Vec<f64> = self
            .rows
            .iter()
            .map(|r| r.response as f64)
            .filter(|r| !r.is_nan())
            .collect();
        if responses.is_empty() {
            return None;
        }

        let n = responses.len() as f64;
        let mean = responses.iter().sum::<f64>() / n;
        let var = responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        (var > 0.).then(|| ResponseNormalization {
            sub: mean as f32,
            mul: (1. / var.sqrt()) as f32,
        })
    }
}

impl RowSource for InMemoryFrame {
    fn nrows(&self) -> usize {
        self.rows.len()
    }

    fn nchunks(&self) -> usize {
        self.rows.len().div_ceil(self.chunk_size)
    }

    fn chunk(&self, idx: usize) -> Range<usize> {
        let start = idx * self.chunk_size;
        start..(start + self.chunk_size).min(self.rows.len())
    }

    fn shape(&self) -> DataShape {
        self.shape
    }

    fn read_row(&self, idx: usize, row: &mut Row) -> Result<()> {
        row.clone_from(&self.rows[idx]);
        Ok(())
    }
}
