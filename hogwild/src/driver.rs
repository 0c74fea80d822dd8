use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use deep_learning::{ModelInfo, Network, Row};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use serde::Serialize;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::{
    Result, TrainErr,
    cluster::Topology,
    config::TrainingConfig,
    data::RowSource,
    metrics::RoundMetrics,
    store::{self, ModelStore},
    sync::{self, NodeResult},
    task::NodeTask,
};

/// Why the driver stopped training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The requested number of epochs was processed.
    Converged,
    /// The model diverged.
    Unstable,
    /// The cancellation token fired.
    Cancelled,
    /// The wall clock limit was reached.
    TimeLimit,
    /// No row of the source can be trained on.
    NoTrainableRows,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Converged => "done",
            StopReason::Unstable => "model is unstable",
            StopReason::Cancelled => "cancelled",
            StopReason::TimeLimit => "time limit reached",
            StopReason::NoTrainableRows => "no trainable rows",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of a training job.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: ModelInfo,
    pub reason: StopReason,
    pub rounds: Vec<RoundMetrics>,
}

/// Runs training rounds over a simulated cluster until the model converges, diverges or the
/// job is cancelled.
pub struct Driver {
    config: TrainingConfig,
    store: Arc<dyn ModelStore>,
    token: CancellationToken,
    pool: ThreadPool,
}

impl Driver {
    /// Creates a new driver.
    ///
    /// # Arguments
    /// * `config` - The cluster and driver settings.
    /// * `store` - The store backing elastic averaging.
    ///
    /// # Returns
    /// A new `Driver` or an error if the worker pool can't be built.
    pub fn new(config: TrainingConfig, store: Arc<dyn ModelStore>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("hogwild-{i}"));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| TrainErr::ThreadPool(e.to_string()))?;

        Ok(Self {
            config,
            store,
            token: CancellationToken::new(),
            pool,
        })
    }

    /// A token that stops training after the round in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `model` on `source`.
    ///
    /// Cancellation and the time limit are checked between rounds, a round in flight always
    /// runs to completion. Must be called from a multi threaded runtime.
    ///
    /// # Arguments
    /// * `model` - The initialized model to train.
    /// * `source` - The training rows.
    ///
    /// # Returns
    /// The trained model and why training stopped.
    pub async fn train<S: RowSource>(&self, model: ModelInfo, source: &S) -> Result<TrainingOutcome> {
        let params = model.params();
        self.config.validate(params)?;
        if source.shape() != model.shape() {
            return Err(TrainErr::InvalidConfig(format!(
                "rows have shape {:?} but the model expects {:?}",
                source.shape(),
                model.shape()
            )));
        }

        let nrows = source.nrows();
        let target = (params.epochs * nrows as f64).ceil() as u64;
        let start = Instant::now();

        info!(
            model = model.model_id(),
            nodes = self.config.nodes,
            rows = nrows,
            target = target;
            "starting training"
        );

        let mut shared = model;
        let mut rounds = Vec::new();
        let reason = loop {
            if rounds.is_empty() && !has_trainable_row(&shared, source)? {
                warn!(model = shared.model_id(); "stopping, no row could be trained on");
                break StopReason::NoTrainableRows;
            }
            if self.token.is_cancelled() {
                warn!(model = shared.model_id(); "training cancelled");
                break StopReason::Cancelled;
            }
            if self.timed_out(start) {
                warn!(model = shared.model_id(); "training stopped by the time limit");
                break StopReason::TimeLimit;
            }

            let round = rounds.len() as u64;
            let before = shared.processed_global();
            let round_start = Instant::now();

            shared = task::block_in_place(|| self.pool.install(|| self.run_round(shared, source, round)))?;

            let diagnostics = shared.compute_stats();
            let metrics = RoundMetrics {
                round,
                processed: shared.processed_global() - before,
                processed_total: shared.processed_global(),
                epochs: shared.processed_global() as f64 / nrows.max(1) as f64,
                duration: round_start.elapsed(),
                diagnostics,
            };
            info!(
                round = round,
                processed = metrics.processed_total,
                epochs = metrics.epochs,
                speed = metrics.samples_per_sec();
                "finished a training round"
            );

            let unstable = metrics.diagnostics.unstable || shared.is_unstable();
            rounds.push(metrics);

            if unstable {
                warn!(model = shared.model_id(); "stopping, the model is unstable");
                break StopReason::Unstable;
            }
            if shared.processed_global() >= target {
                break StopReason::Converged;
            }
            task::yield_now().await;
        };

        self.cleanup(&shared)?;
        info!(
            model = shared.model_id(),
            rounds = rounds.len(),
            reason = reason.as_str();
            "training finished"
        );

        Ok(TrainingOutcome {
            model: shared,
            reason,
            rounds,
        })
    }

    /// Runs one round on every node and combines their models.
    ///
    /// # Arguments
    /// * `shared` - The model every node starts from.
    /// * `source` - The training rows.
    /// * `round` - The round number.
    ///
    /// # Returns
    /// The shared model of the next round.
    pub fn run_round<S: RowSource>(&self, shared: ModelInfo, source: &S, round: u64) -> Result<ModelInfo> {
        let store = self.store.as_ref();
        let nodes = self.config.nodes;
        let params = shared.params();
        let processed_global = shared.processed_global();

        let single = NodeTask::new(&shared, source, store, Topology::single(), round);
        if nodes == 1 && single.trains_in_place() {
            single.run()?;
            shared.set_processed_global(processed_global + shared.processed_local());
            shared.set_processed_local(0);
            return Ok(shared);
        }

        let reduced = Topology::all(nodes)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|topology| NodeTask::new(&shared, source, store, topology, round).run())
            .try_reduce(NodeResult::empty, |a, b| Ok(a.reduce(b)))?;
        debug!(round = round, workers = reduced.workers(); "reduced the node models");

        let elastic = params.elastic_averaging.then_some(params.elastic_averaging_moving_rate);
        let Some(average) = reduced.finalize(processed_global) else {
            return Ok(shared);
        };

        match elastic {
            Some(moving_rate) => sync::time_average(average, store, moving_rate),
            None => Ok(average),
        }
    }

    fn timed_out(&self, start: Instant) -> bool {
        self.config
            .max_runtime()
            .is_some_and(|limit: Duration| start.elapsed() >= limit)
    }

    fn cleanup(&self, model: &ModelInfo) -> Result<()> {
        if !model.params().elastic_averaging {
            return Ok(());
        }

        let model_id = model.model_id();
        for node in 0..self.config.nodes {
            self.store.remove(&store::local_key(model_id, node))?;
        }
        self.store.remove(&store::consensus_key(model_id))
    }
}

/// Whether at least one row of `source` can be trained on. Rounds that happen to sample no
/// trainable row don't stop training as long as this holds.
fn has_trainable_row<S: RowSource>(model: &ModelInfo, source: &S) -> Result<bool> {
    let net = Network::new(model, false);
    let mut row = Row::default();
    for idx in 0..source.nrows() {
        source.read_row(idx, &mut row)?;
        if net.is_trainable(&row) {
            return Ok(true);
        }
    }
    Ok(false)
}
