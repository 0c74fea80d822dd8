mod matrix;
mod sparse;
mod vector;
mod wild;

pub use matrix::{DenseColMatrix, DenseRowMatrix, Matrix};
pub use sparse::SparseVector;
pub use vector::DenseVector;
pub use wild::WildBuf;
