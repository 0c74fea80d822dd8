use ndarray::{ArrayView2, ShapeBuilder};
use serde::{Deserialize, Serialize};

use super::WildBuf;

/// A dense row major matrix, value `(row, col)` lives at `row * cols + col`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseRowMatrix {
    rows: usize,
    cols: usize,
    data: WildBuf,
}

impl DenseRowMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: WildBuf::zeros(rows * cols),
        }
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        // The buffer always holds exactly `rows * cols` values.
        ArrayView2::from_shape((self.rows, self.cols), self.data.as_slice())
            .expect("row major buffer matches its shape")
    }
}

/// A dense column major matrix, value `(row, col)` lives at `col * rows + row`.
///
/// Only used for the first layer of wide sparse inputs where walking the non zero input columns
/// is cheaper than walking every row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseColMatrix {
    rows: usize,
    cols: usize,
    data: WildBuf,
}

impl DenseColMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: WildBuf::zeros(rows * cols),
        }
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        col * self.rows + row
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        ArrayView2::from_shape((self.rows, self.cols).f(), self.data.as_slice())
            .expect("column major buffer matches its shape")
    }
}

/// The weights connecting two adjacent layers, stored either row or column major.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matrix {
    Row(DenseRowMatrix),
    Col(DenseColMatrix),
}

impl Matrix {
    pub fn row_major(rows: usize, cols: usize) -> Self {
        Self::Row(DenseRowMatrix::zeros(rows, cols))
    }

    pub fn col_major(rows: usize, cols: usize) -> Self {
        Self::Col(DenseColMatrix::zeros(rows, cols))
    }

    #[inline]
    pub fn rows(&self) -> usize {
        match self {
            Matrix::Row(m) => m.rows,
            Matrix::Col(m) => m.rows,
        }
    }

    #[inline]
    pub fn cols(&self) -> usize {
        match self {
            Matrix::Row(m) => m.cols,
            Matrix::Col(m) => m.cols,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_col_major(&self) -> bool {
        matches!(self, Matrix::Col(_))
    }

    /// Flat position of `(row, col)` inside the raw buffer.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        match self {
            Matrix::Row(m) => m.index(row, col),
            Matrix::Col(m) => m.index(row, col),
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data().get(self.index(row, col))
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        self.data().set(self.index(row, col), value)
    }

    #[inline]
    pub fn add(&self, row: usize, col: usize, delta: f32) {
        self.data().add(self.index(row, col), delta)
    }

    /// The underlying lock-free buffer.
    #[inline]
    pub fn data(&self) -> &WildBuf {
        match self {
            Matrix::Row(m) => &m.data,
            Matrix::Col(m) => &m.data,
        }
    }

    #[inline]
    pub fn raw(&self) -> &[f32] {
        self.data().as_slice()
    }

    pub fn raw_mut(&mut self) -> &mut [f32] {
        match self {
            Matrix::Row(m) => m.data.as_mut_slice(),
            Matrix::Col(m) => m.data.as_mut_slice(),
        }
    }

    /// A logical `(rows, cols)` view, whatever the memory layout is.
    pub fn view(&self) -> ArrayView2<'_, f32> {
        match self {
            Matrix::Row(m) => m.view(),
            Matrix::Col(m) => m.view(),
        }
    }
}
