pub mod cluster;
pub mod config;
pub mod data;
pub mod driver;
mod error;
pub mod metrics;
pub mod store;
pub mod sync;
pub mod task;

pub use cluster::Topology;
pub use config::TrainingConfig;
pub use data::{InMemoryFrame, RowSource};
pub use driver::{Driver, StopReason, TrainingOutcome};
pub use error::{Result, TrainErr};
pub use metrics::RoundMetrics;
pub use store::{InMemoryStore, JsonFileStore, ModelStore};
