use deep_learning::ModelInfo;
use log::debug;

use crate::{
    Result,
    store::{self, ModelStore},
};

/// Blends the round's average into the cluster wide consensus model:
/// `consensus = moving_rate * average + (1 - moving_rate) * consensus`.
///
/// The first round, or a moving rate of 1, adopts the average as is. The blended model is
/// written back to the store and becomes the shared model of the next round, while every node
/// keeps refining its own local copy.
///
/// # Arguments
/// * `average` - The averaged model of the round, with its samples already committed.
/// * `store` - The store holding the consensus.
/// * `moving_rate` - The weight of the new average.
///
/// # Returns
/// The new consensus model.
pub fn time_average(average: ModelInfo, store: &dyn ModelStore, moving_rate: f64) -> Result<ModelInfo> {
    let key = store::consensus_key(average.model_id());
    let previous = store.get(&key)?;

    let consensus = match previous {
        Some(mut consensus) if moving_rate < 1. => {
            let mut average = average;
            average.mult(moving_rate as f32);
            consensus.mult((1. - moving_rate) as f32);
            consensus.add(&average);
            if average.is_unstable() {
                consensus.set_unstable();
            }
            consensus.set_processed_global(average.processed_global());
            consensus
        }
        _ => average,
    };
    consensus.set_processed_local(0);

    debug!(key = key.as_str(), moving_rate = moving_rate; "updated the elastic average");
    store.put(&key, &consensus)?;
    Ok(consensus)
}
