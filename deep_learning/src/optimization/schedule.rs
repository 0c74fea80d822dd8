use serde::{Deserialize, Serialize};

/// Manually tuned learning rate with annealing, per layer decay and a momentum ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualRate {
    pub rate: f64,
    pub rate_annealing: f64,
    pub rate_decay: f64,
    pub momentum_start: f64,
    pub momentum_ramp: f64,
    pub momentum_stable: f64,
    pub nesterov: bool,
}

impl ManualRate {
    /// The learning rate after `processed` training samples, `rate / (1 + annealing * n)`.
    ///
    /// # Arguments
    /// * `depth` - Layer depth, 1 for the first hidden layer, decays the rate by
    ///   `rate_decay^(depth - 1)`.
    /// * `processed` - The total number of samples the model has been trained on.
    pub fn rate(&self, depth: usize, processed: u64) -> f32 {
        let decay = self.rate_decay.powi(depth.saturating_sub(1) as i32);
        (self.rate * decay / (1. + self.rate_annealing * processed as f64)) as f32
    }

    /// The momentum after `processed` training samples, a linear ramp from `momentum_start` to
    /// `momentum_stable` over `momentum_ramp` samples.
    pub fn momentum(&self, processed: u64) -> f32 {
        let n = processed as f64;
        let m = if self.momentum_ramp > 0. && n < self.momentum_ramp {
            self.momentum_start + (self.momentum_stable - self.momentum_start) * n / self.momentum_ramp
        } else if self.momentum_ramp > 0. {
            self.momentum_stable
        } else {
            self.momentum_start
        };
        m as f32
    }

    pub fn has_momentum(&self) -> bool {
        self.momentum_start != 0. || self.momentum_stable != 0.
    }
}
