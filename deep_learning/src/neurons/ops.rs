use ndarray::{ArrayView1, ArrayViewMut1};

use super::Activations;
use crate::{
    dropout::Dropout,
    storage::{Matrix, WildBuf},
};

#[inline]
fn active(dropout: Option<&Dropout>, row: usize) -> bool {
    dropout.is_none_or(|d| d.unit_active(row))
}

/// Computes `out = W x + b`, rows dropped by `dropout` are left at zero.
///
/// Row major weights take a dot product per output row, column major weights start from the
/// bias and accumulate one column per non zero input.
///
/// # Arguments
/// * `out` - The destination, one value per row of `w`.
/// * `w` - The weights.
/// * `x` - The incoming activations, one value per column of `w`.
/// * `b` - The biases, one per row of `w`.
/// * `dropout` - The layer's dropout mask, if any.
pub(crate) fn gemv(
    out: &mut [f32],
    w: &Matrix,
    x: Activations,
    b: &[f32],
    dropout: Option<&Dropout>,
) {
    match (w, x) {
        (Matrix::Row(m), Activations::Dense(x)) => {
            let (w, x) = (m.view(), ArrayView1::from(x));
            for (row, o) in out.iter_mut().enumerate() {
                *o = if active(dropout, row) {
                    w.row(row).dot(&x) + b[row]
                } else {
                    0.
                };
            }
        }
        (Matrix::Row(m), Activations::Sparse(x)) => {
            let w = m.view();
            for (row, o) in out.iter_mut().enumerate() {
                *o = if active(dropout, row) {
                    x.iter().map(|(col, v)| w[[row, col]] * v).sum::<f32>() + b[row]
                } else {
                    0.
                };
            }
        }
        (Matrix::Col(m), x) => {
            let w = m.view();
            let mut acc = ArrayViewMut1::from(&mut *out);
            acc.assign(&ArrayView1::from(b));
            x.for_each_nonzero(|col, v| acc.scaled_add(v, &w.column(col)));

            for (row, o) in out.iter_mut().enumerate() {
                if !active(dropout, row) {
                    *o = 0.;
                }
            }
        }
    }
}

/// Two channel maxout: `out[row] = max_k (w[row, k] · x + b[2 row + k])`.
///
/// Channel `k` of unit `row` reads its weight for input `col` at `2 * (row * cols + col) + k`.
/// The winning channel of each active unit is written to `winners`.
pub(crate) fn maxout(
    out: &mut [f32],
    winners: &mut [usize],
    w: &Matrix,
    x: Activations,
    b: &[f32],
    dropout: Option<&Dropout>,
) {
    let cols = x.len();
    let raw = w.raw();

    for (row, o) in out.iter_mut().enumerate() {
        *o = 0.;
        if !active(dropout, row) {
            continue;
        }

        let mut channels = [b[2 * row], b[2 * row + 1]];
        x.for_each_nonzero(|col, v| {
            let base = 2 * (row * cols + col);
            channels[0] += raw[base] * v;
            channels[1] += raw[base + 1] * v;
        });

        let k = usize::from(channels[1] > channels[0]);
        winners[row] = k;
        *o = channels[k];
    }
}

/// Scales the weights at `indices` down so their squared L2 norm is at most `max_w2`.
pub(crate) fn rescale_row(buf: &WildBuf, indices: impl Iterator<Item = usize> + Clone, max_w2: f32) {
    let r2: f64 = indices.clone().map(|i| (buf.get(i) as f64).powi(2)).sum();
    if r2 <= max_w2 as f64 {
        return;
    }

    let scale = (max_w2 as f64 / r2).sqrt() as f32;
    for i in indices {
        buf.set(i, buf.get(i) * scale);
    }
}
