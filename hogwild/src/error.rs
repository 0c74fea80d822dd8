use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use deep_learning::DlErr;

/// The result type used across the training engine.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// The training engine's error type.
#[derive(Debug)]
pub enum TrainErr {
    Model(DlErr),
    InvalidConfig(String),
    Io(io::Error),
    Serde(serde_json::Error),
    ThreadPool(String),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Model(e) => write!(f, "model error: {e}"),
            TrainErr::InvalidConfig(reason) => write!(f, "invalid training configuration: {reason}"),
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Serde(e) => write!(f, "failed to (de)serialize a model snapshot: {e}"),
            TrainErr::ThreadPool(reason) => write!(f, "failed to build the worker pool: {reason}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Model(e) => Some(e),
            TrainErr::Io(e) => Some(e),
            TrainErr::Serde(e) => Some(e),
            TrainErr::InvalidConfig(_) | TrainErr::ThreadPool(_) => None,
        }
    }
}

impl From<DlErr> for TrainErr {
    fn from(value: DlErr) -> Self {
        Self::Model(value)
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            e => io::Error::other(e),
        }
    }
}
