use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

/// Salt mixed into the row seed for input dropout.
pub const INPUT_SALT: u64 = 0x1337B4BE;
/// Salt mixed into the row seed for `TanhWithDropout` layers.
pub const TANH_SALT: u64 = 0xDA7A6000;
/// Salt mixed into the row seed for `RectifierWithDropout` layers.
pub const RECTIFIER_SALT: u64 = 0x3C71F1ED;
/// Salt mixed into the row seed for `MaxoutWithDropout` layers.
pub const MAXOUT_SALT: u64 = 0x51C8D00D;

/// Per layer dropout state.
///
/// Input layers use `randomly_sparsify` to zero single activations, hidden layers keep a bit
/// mask regenerated with `fill_bytes` and queried with `unit_active`.
#[derive(Debug, Clone)]
pub struct Dropout {
    units: usize,
    ratio: f64,
    bits: Vec<u8>,
}

impl Dropout {
    /// Creates a new `Dropout` for a layer of `units` neurons.
    ///
    /// # Arguments
    /// * `units` - The layer width.
    /// * `ratio` - Probability of dropping each unit, in `[0, 1)`.
    ///
    /// # Returns
    /// A new `Dropout` instance with every unit active.
    pub fn new(units: usize, ratio: f64) -> Self {
        Self {
            units,
            ratio,
            bits: vec![u8::MAX; units.div_ceil(8)],
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Zeroes each value of `a` independently with probability `ratio`.
    pub fn randomly_sparsify(&self, a: &mut [f32], seed: u64) {
        if self.ratio == 0. {
            return;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for v in a.iter_mut() {
            if rng.random::<f64>() < self.ratio {
                *v = 0.;
            }
        }
    }

    /// Regenerates the bit mask deterministically from `seed`.
    pub fn fill_bytes(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);

        if self.ratio == 0.5 {
            rng.fill_bytes(&mut self.bits);
            return;
        }

        self.bits.fill(0);
        for unit in 0..self.units {
            if rng.random::<f64>() > self.ratio {
                self.bits[unit / 8] |= 1 << (unit % 8);
            }
        }
    }

    #[inline]
    pub fn unit_active(&self, unit: usize) -> bool {
        self.bits[unit / 8] & (1 << (unit % 8)) != 0
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_mask() {
        for ratio in [0.5, 0.2] {
            let mut a = Dropout::new(100, ratio);
            let mut b = Dropout::new(100, ratio);
            a.fill_bytes(42);
            b.fill_bytes(42);
            assert_eq!(a.bits(), b.bits());

            b.fill_bytes(43);
            assert_ne!(a.bits(), b.bits());
        }
    }

    #[test]
    fn mask_rate_matches_ratio() {
        let mut dropout = Dropout::new(10_000, 0.3);
        dropout.fill_bytes(7);

        let active = (0..10_000).filter(|&u| dropout.unit_active(u)).count();
        assert!((6_500..7_500).contains(&active), "{active} active units");
    }

    #[test]
    fn zero_ratio_keeps_everything() {
        let mut dropout = Dropout::new(13, 0.);
        dropout.fill_bytes(1);
        assert!((0..13).all(|u| dropout.unit_active(u)));

        let mut a = vec![1.; 13];
        dropout.randomly_sparsify(&mut a, 1);
        assert_eq!(a, vec![1.; 13]);
    }

    #[test]
    fn sparsify_only_zeroes() {
        let dropout = Dropout::new(1000, 0.5);
        let mut a = vec![2.; 1000];
        dropout.randomly_sparsify(&mut a, 3);

        let zeros = a.iter().filter(|v| **v == 0.).count();
        assert!(a.iter().all(|v| *v == 0. || *v == 2.));
        assert!((400..600).contains(&zeros));
    }
}
