use crate::storage::WildBuf;

/// Applies a manual learning rate step to parameter `i`.
///
/// Classic momentum adds the previous step on top of the new one, Nesterov folds the momentum
/// into the gradient before scaling it.
///
/// # Arguments
/// * `params` - The parameter buffer.
/// * `momenta` - The momentum buffer, `None` without momentum.
/// * `i` - The parameter index.
/// * `grad` - The negative gradient.
/// * `rate` - The learning rate.
/// * `momentum` - The momentum factor.
/// * `nesterov` - Whether to use Nesterov accelerated gradient.
#[inline]
pub fn step(
    params: &WildBuf,
    momenta: Option<&WildBuf>,
    i: usize,
    grad: f64,
    rate: f32,
    momentum: f32,
    nesterov: bool,
) {
    if !nesterov {
        let delta = rate as f64 * grad;
        params.add(i, delta as f32);
        if let Some(momenta) = momenta {
            params.add(i, momentum * momenta.get(i));
            momenta.set(i, delta as f32);
        }
        return;
    }

    let mut d = grad;
    if let Some(momenta) = momenta {
        let m = momenta.get(i) as f64 * momentum as f64 + grad;
        momenta.set(i, m as f32);
        d = m;
    }
    params.add(i, (rate as f64 * d) as f32);
}
