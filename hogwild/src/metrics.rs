use std::{fmt, time::Duration};

use deep_learning::Diagnostics;
use serde::Serialize;

/// What happened during one training round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundMetrics {
    pub round: u64,
    /// Samples trained on during the round.
    pub processed: u64,
    /// Samples committed to the model so far.
    pub processed_total: u64,
    pub epochs: f64,
    pub duration: Duration,
    pub diagnostics: Diagnostics,
}

impl RoundMetrics {
    pub fn samples_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0. {
            self.processed as f64 / secs
        } else {
            0.
        }
    }
}

impl fmt::Display for RoundMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {}: {} samples ({:.3} epochs), {:.0} samples/s",
            self.round,
            self.processed_total,
            self.epochs,
            self.samples_per_sec()
        )?;
        if self.diagnostics.unstable {
            write!(f, ", unstable")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed() {
        let metrics = RoundMetrics {
            round: 1,
            processed: 500,
            processed_total: 1000,
            epochs: 2.,
            duration: Duration::from_millis(250),
            diagnostics: Diagnostics::default(),
        };
        assert_eq!(metrics.samples_per_sec(), 2000.);
        assert_eq!(metrics.to_string(), "round 1: 1000 samples (2.000 epochs), 2000 samples/s");

        let instant = RoundMetrics {
            duration: Duration::ZERO,
            ..metrics
        };
        assert_eq!(instant.samples_per_sec(), 0.);
    }
}
