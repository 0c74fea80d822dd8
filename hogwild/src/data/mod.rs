mod frame;
mod shard;

use std::ops::Range;

use deep_learning::{DataShape, Row};

pub use frame::InMemoryFrame;
pub use shard::{intersect, shard_range};

use crate::Result;

/// A horizontally chunked source of encoded rows.
///
/// Chunks are the unit of node-local parallelism: every chunk is trained by one worker thread.
pub trait RowSource: Sync {
    /// Total number of rows.
    fn nrows(&self) -> usize;

    /// Number of chunks the rows are split into.
    fn nchunks(&self) -> usize;

    /// The row indices of chunk `idx`, chunks are contiguous and ordered.
    fn chunk(&self, idx: usize) -> Range<usize>;

    /// Width of the encoded rows.
    fn shape(&self) -> DataShape;

    /// Reads row `idx` into `row`, reusing its allocations.
    fn read_row(&self, idx: usize, row: &mut Row) -> Result<()>;
}
