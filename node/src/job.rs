use std::{fs, io, path::PathBuf, sync::Arc};

use deep_learning::{DataShape, DeepLearningParams, ModelInfo, Row};
use hogwild::{InMemoryFrame, InMemoryStore, JsonFileStore, ModelStore, TrainingConfig};
use serde::Deserialize;

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A training job read from a JSON file.
#[derive(Debug, Deserialize)]
pub struct Job {
    pub model_id: String,
    #[serde(default)]
    pub params: DeepLearningParams,
    #[serde(default)]
    pub training: TrainingConfig,
    /// Classes of the response, 1 for regression.
    #[serde(default = "regression")]
    pub n_classes: usize,
    pub shape: DataShape,
    pub rows: Vec<Row>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Standardize a regression response before training.
    #[serde(default)]
    pub standardize_response: bool,
    /// Directory backing elastic averaging, in memory when absent.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// Where to write the trained model.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn regression() -> usize {
    1
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Job {
    pub fn load(path: &str) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(io::Error::other)
    }

    /// Splits the job into the rows, the initialized model and the store.
    pub fn build(self) -> io::Result<(InMemoryFrame, ModelInfo, Arc<dyn ModelStore>)> {
        let frame = InMemoryFrame::new(self.shape, self.rows, self.chunk_size)?;

        let mut model = ModelInfo::new(self.model_id, self.params, self.shape, self.n_classes)
            .map_err(io::Error::other)?;
        model.initialize().map_err(io::Error::other)?;
        if self.standardize_response && !model.is_classification() {
            model.set_normalization(frame.response_normalization());
        }

        let store: Arc<dyn ModelStore> = match self.store_dir {
            Some(dir) => Arc::new(JsonFileStore::new(dir)?),
            None => Arc::new(InMemoryStore::new()),
        };
        Ok((frame, model, store))
    }
}
