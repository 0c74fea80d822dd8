use std::ops::Range;

use deep_learning::{DeepLearningParams, ModelInfo, Network, Row};
use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::prelude::*;

use crate::{
    Result,
    cluster::Topology,
    data::{RowSource, intersect, shard_range},
    store::{self, ModelStore},
    sync::NodeResult,
};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Samples each node trains on per round.
///
/// 0 is one epoch, -1 and -2 are every row on every node when the data is replicated (one
/// epoch otherwise) and any positive value is taken literally.
pub fn samples_per_iteration(params: &DeepLearningParams, nrows: usize, nodes: usize) -> u64 {
    let nrows = nrows as u64;
    match params.train_samples_per_iteration {
        0 => nrows,
        n if n < 0 && params.replicate_training_data => nrows * nodes as u64,
        n if n < 0 => nrows,
        n => n as u64,
    }
}

/// Fraction of its rows every node visits per round, may exceed 1.
pub fn row_fraction(params: &DeepLearningParams, nrows: usize, nodes: usize) -> f64 {
    if nrows == 0 {
        return 0.;
    }

    let samples = samples_per_iteration(params, nrows, nodes) as f64;
    let fraction = samples / nrows as f64;
    if params.replicate_training_data {
        fraction / nodes as f64
    } else {
        fraction
    }
}

/// Seed of the row sampler of one chunk.
pub fn chunk_seed(seed: u64, round: u64, node: usize, chunk: usize) -> u64 {
    seed.wrapping_add(round.wrapping_mul(GOLDEN_GAMMA))
        .wrapping_add((node as u64).wrapping_mul(GOLDEN_GAMMA.rotate_left(17)))
        .wrapping_add(chunk as u64)
}

/// Picks the rows of `range` to train on: `floor(fraction)` full passes followed by a random
/// subset holding each row with probability `fraction - floor(fraction)`.
///
/// # Arguments
/// * `range` - The candidate rows.
/// * `fraction` - How many times, on average, each row is visited.
/// * `shuffle` - Whether to shuffle every pass.
/// * `rng` - The seeded sampler.
pub fn sample_rows(range: Range<usize>, fraction: f64, shuffle: bool, rng: &mut StdRng) -> Vec<usize> {
    let passes = fraction.floor().max(0.) as usize;
    let remainder = fraction - fraction.floor();

    let mut rows = Vec::with_capacity(((range.len() as f64) * fraction.max(0.)).ceil() as usize);
    for _ in 0..passes {
        let start = rows.len();
        rows.extend(range.clone());
        if shuffle {
            rows[start..].shuffle(rng);
        }
    }

    if remainder > 0. {
        let start = rows.len();
        rows.extend(range.filter(|_| rng.random::<f64>() < remainder));
        if shuffle {
            rows[start..].shuffle(rng);
        }
    }

    rows
}

/// One node's share of a training round.
///
/// All chunks assigned to the node are trained concurrently, every worker thread builds its
/// own layers over the same model and updates it without locks.
pub struct NodeTask<'a, S: RowSource> {
    shared: &'a ModelInfo,
    source: &'a S,
    store: &'a dyn ModelStore,
    topology: Topology,
    round: u64,
}

impl<'a, S: RowSource> NodeTask<'a, S> {
    /// Creates a new node task.
    ///
    /// # Arguments
    /// * `shared` - The model every node starts the round from (the consensus under elastic
    ///   averaging).
    /// * `source` - The training rows.
    /// * `store` - Where elastic averaging keeps the node's local model between rounds.
    /// * `topology` - This node's position in the cluster.
    /// * `round` - The round number, mixed into the sampling and dropout seeds.
    ///
    /// # Returns
    /// A new `NodeTask` instance.
    pub fn new(
        shared: &'a ModelInfo,
        source: &'a S,
        store: &'a dyn ModelStore,
        topology: Topology,
        round: u64,
    ) -> Self {
        Self {
            shared,
            source,
            store,
            topology,
            round,
        }
    }

    /// Whether this node updates the shared model in place instead of a private copy.
    pub fn trains_in_place(&self) -> bool {
        !self.topology.is_multi_node() && !self.shared.params().elastic_averaging
    }

    /// The chunks, or parts of chunks, this node trains on.
    pub fn assigned_rows(&self) -> Vec<Range<usize>> {
        let chunks = (0..self.source.nchunks()).map(|c| self.source.chunk(c));
        if self.shared.params().replicate_training_data || !self.topology.is_multi_node() {
            return chunks.filter(|r| !r.is_empty()).collect();
        }

        let partition = shard_range(self.source.nrows(), self.topology.node, self.topology.nodes);
        chunks.filter_map(|c| intersect(c, &partition)).collect()
    }

    /// Trains the node's model for one round.
    ///
    /// # Returns
    /// The node's trained model, or an empty result when the shared model was trained in place.
    pub fn run(&self) -> Result<NodeResult> {
        if self.trains_in_place() {
            self.train(self.shared, None)?;
            return Ok(NodeResult::empty());
        }

        let params = self.shared.params();
        let model_id = self.shared.model_id();

        if !params.elastic_averaging {
            let local = self.shared.clone();
            local.set_processed_local(0);
            self.train(&local, None)?;
            return Ok(NodeResult::new(local));
        }

        let key = store::local_key(model_id, self.topology.node);
        let local = match self.store.get(&key)? {
            Some(local) => local,
            None => self.shared.clone(),
        };
        local.set_processed_global(self.shared.processed_global());
        local.set_processed_local(0);

        self.train(&local, Some(self.shared))?;
        self.store.put(&key, &local)?;
        Ok(NodeResult::new(local))
    }

    fn train(&self, model: &ModelInfo, consensus: Option<&ModelInfo>) -> Result<u64> {
        let params = model.params();
        let nrows = self.source.nrows();
        let fraction = row_fraction(params, nrows, self.topology.nodes);
        let chunks = self.assigned_rows();

        let trained = chunks
            .into_par_iter()
            .enumerate()
            .map(|(chunk, range)| {
                let seed = chunk_seed(params.seed, self.round, self.topology.node, chunk);
                self.train_chunk(model, consensus, range, fraction, seed)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;

        debug!(
            node = self.topology.node,
            round = self.round,
            trained = trained;
            "node finished its share of the round"
        );
        Ok(trained)
    }

    fn train_chunk(
        &self,
        model: &ModelInfo,
        consensus: Option<&ModelInfo>,
        range: Range<usize>,
        fraction: f64,
        seed: u64,
    ) -> Result<u64> {
        let params = model.params();
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = sample_rows(range, fraction, params.shuffle_training_data, &mut rng);

        let mut net = Network::new(model, true);
        if let Some(consensus) = consensus {
            net = net.with_consensus(consensus);
        }

        let batch = params.mini_batch_size.max(1);
        let mut row = Row::default();
        let (mut trained, mut in_batch) = (0, 0);

        for (n, &idx) in rows.iter().enumerate() {
            self.source.read_row(idx, &mut row)?;

            let row_seed = seed.wrapping_mul(GOLDEN_GAMMA).wrapping_add(n as u64);
            if net.train_row(row_seed, &row, n % batch == 0) {
                in_batch += 1;
            }

            if (n + 1) % batch == 0 {
                model.add_processed_local(in_batch);
                trained += in_batch;
                in_batch = 0;
            }
        }

        model.add_processed_local(in_batch);
        Ok(trained + in_batch)
    }
}
