use std::time::Duration;

use deep_learning::DeepLearningParams;
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// Cluster and driver settings of a training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of (simulated) nodes taking part in every round.
    pub nodes: usize,
    /// Worker threads shared by all nodes, `None` uses one per core.
    pub threads: Option<usize>,
    /// Wall clock limit checked between rounds, 0 disables it.
    pub max_runtime_secs: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            nodes: 1,
            threads: None,
            max_runtime_secs: 0.,
        }
    }
}

impl TrainingConfig {
    /// Checks the configuration against the model parameters it will train.
    pub fn validate(&self, params: &DeepLearningParams) -> Result<()> {
        if self.nodes == 0 {
            return Err(TrainErr::InvalidConfig("there must be at least one node".into()));
        }
        if self.threads == Some(0) {
            return Err(TrainErr::InvalidConfig("threads must be positive".into()));
        }
        if !(self.max_runtime_secs >= 0.) {
            return Err(TrainErr::InvalidConfig("max_runtime_secs must be >= 0".into()));
        }
        if params.elastic_averaging && !params.replicate_training_data && self.nodes > 1 {
            return Err(TrainErr::InvalidConfig(
                "elastic averaging requires replicated training data on more than one node".into(),
            ));
        }
        Ok(())
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_secs > 0.).then(|| Duration::from_secs_f64(self.max_runtime_secs))
    }
}
