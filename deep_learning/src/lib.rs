pub mod dropout;
pub mod error;
pub mod initialization;
pub mod loss;
pub mod model_info;
pub mod network;
pub mod neurons;
pub mod optimization;
pub mod params;
pub mod row;
pub mod stats;
pub mod storage;
mod test;

pub use error::{DlErr, Result};
pub use model_info::{ModelInfo, ResponseNormalization};
pub use network::Network;
pub use params::{Activation, DeepLearningParams, InitialWeightDistribution};
pub use row::{DataShape, Features, Row};
pub use stats::{Diagnostics, LayerStats};
