mod file;
mod memory;

use deep_learning::ModelInfo;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

use crate::Result;

/// A shared key-value store for model snapshots with last-writer-wins semantics.
///
/// Only elastic averaging touches it: every node persists its local model between rounds and
/// the consensus model lives under a cluster wide key.
pub trait ModelStore: Send + Sync {
    /// Stores a snapshot of `model` under `key`, replacing any previous one.
    fn put(&self, key: &str, model: &ModelInfo) -> Result<()>;

    /// Returns a copy of the snapshot stored under `key`.
    fn get(&self, key: &str) -> Result<Option<ModelInfo>>;

    /// Deletes `key`, missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key of the local model persisted by `node`.
pub fn local_key(model_id: &str, node: usize) -> String {
    format!("{model_id}.node{node}")
}

/// Key of the cluster wide elastic average.
pub fn consensus_key(model_id: &str) -> String {
    format!("{model_id}.elasticaverage")
}
