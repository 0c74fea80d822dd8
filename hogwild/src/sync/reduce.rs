use deep_learning::ModelInfo;

/// The partial result of a round: the sum of the models trained by `workers` nodes.
#[derive(Debug, Default)]
pub struct NodeResult {
    model: Option<ModelInfo>,
    workers: usize,
}

impl NodeResult {
    /// A result carrying no model, produced when the shared model was trained in place.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result holding one node's trained model.
    pub fn new(model: ModelInfo) -> Self {
        Self {
            model: Some(model),
            workers: 1,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn model(&self) -> Option<&ModelInfo> {
        self.model.as_ref()
    }

    /// Merges `other` into this result, adding up weights, biases, optimizer helpers and local
    /// sample counters. An unstable partial result makes the whole sum unstable.
    ///
    /// # Arguments
    /// * `other` - The partial result to merge.
    ///
    /// # Returns
    /// The merged result.
    pub fn reduce(mut self, other: NodeResult) -> NodeResult {
        let Some(theirs) = other.model else {
            return self;
        };

        match &mut self.model {
            None => self.model = Some(theirs),
            Some(mine) => {
                mine.add(&theirs);
                if theirs.is_unstable() {
                    mine.set_unstable();
                }
            }
        }
        self.workers += other.workers;
        self
    }

    /// Turns the sum into the average model of the round.
    ///
    /// # Arguments
    /// * `processed_global` - The globally committed sample count the round started from.
    ///
    /// # Returns
    /// The averaged model with the round's samples committed, `None` if nothing was reduced.
    pub fn finalize(self, processed_global: u64) -> Option<ModelInfo> {
        let mut model = self.model?;
        if self.workers > 1 {
            model.div(self.workers as f32);
        }

        model.set_processed_global(processed_global + model.processed_local());
        model.set_processed_local(0);
        Some(model)
    }
}
