//! Combines the models trained by every node at the end of a round.

mod elastic;
mod reduce;

pub use elastic::time_average;
pub use reduce::NodeResult;
