use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type used in the entire deep learning module.
pub type Result<T> = std::result::Result<T, DlErr>;

/// The deep learning module's error type.
#[derive(Debug)]
pub enum DlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
    DimensionMismatch {
        layer: usize,
        what: &'static str,
        got: usize,
        expected: usize,
    },
    UnsortedSparseIndices {
        position: usize,
    },
    Unstable,
    /// The initial weight distribution can't be built, e.g. an empty uniform range.
    WeightDistribution(String),
}

impl DlErr {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for DlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DlErr::SizeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch in {what}, got {got} and expected {expected}"),
            DlErr::InvalidConfig { field, reason } => {
                format!("Invalid value for `{field}`: {reason}")
            }
            DlErr::DimensionMismatch {
                layer,
                what,
                got,
                expected,
            } => format!(
                "Dimensionality mismatch in layer {layer}: {what} is {got} but the model expects {expected}"
            ),
            DlErr::UnsortedSparseIndices { position } => format!(
                "Sparse indices must be strictly increasing, violated at position {position}"
            ),
            DlErr::Unstable => {
                "The model is unstable, its weights or biases diverged (NaN or too large)"
                    .to_string()
            }
            DlErr::WeightDistribution(e) => format!("Failed to initialize the weights: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for DlErr {}

impl From<NormalError> for DlErr {
    fn from(value: NormalError) -> Self {
        Self::WeightDistribution(value.to_string())
    }
}

impl From<UniformError> for DlErr {
    fn from(value: UniformError) -> Self {
        Self::WeightDistribution(value.to_string())
    }
}
