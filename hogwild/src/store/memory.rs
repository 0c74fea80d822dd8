use std::collections::HashMap;

use deep_learning::ModelInfo;
use parking_lot::RwLock;

use super::ModelStore;
use crate::Result;

/// A process local `ModelStore`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    models: RwLock<HashMap<String, ModelInfo>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelStore for InMemoryStore {
    fn put(&self, key: &str, model: &ModelInfo) -> Result<()> {
        self.models.write().insert(key.to_string(), model.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<ModelInfo>> {
        Ok(self.models.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.models.write().remove(key);
        Ok(())
    }
}
