//! Element-wise nonlinearities applied after the affine step of a layer.

/// `tanh(x)` written as `1 - 2 / (1 + exp(2x))`, saturates cleanly at ±1.
pub(crate) fn tanh(a: &mut [f32]) {
    for v in a {
        *v = 1. - 2. / (1. + (2. * *v).exp());
    }
}

/// `max(0, x)` written as `0.5 * (x + |x|)`.
pub(crate) fn rectifier(a: &mut [f32]) {
    for v in a {
        *v = 0.5 * (*v + v.abs());
    }
}

/// Numerically stable softmax.
///
/// # Returns
/// `false` if the normalization constant is not a finite positive number, which only happens
/// when the incoming values diverged.
pub(crate) fn softmax(a: &mut [f32]) -> bool {
    let max = a.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.;
    for v in a.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if !sum.is_finite() || sum <= 0. {
        return false;
    }

    for v in a.iter_mut() {
        *v /= sum;
    }
    true
}

/// Divides every value by the largest one when it exceeds 1.
pub(crate) fn max_norm(a: &mut [f32]) {
    let max = a.iter().copied().fold(0., f32::max);
    if max > 1. {
        for v in a {
            *v /= max;
        }
    }
}
