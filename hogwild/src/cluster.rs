use serde::{Deserialize, Serialize};

/// The position of one node inside the training cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: usize,
    pub node: usize,
}

impl Topology {
    pub fn single() -> Self {
        Self { nodes: 1, node: 0 }
    }

    /// Every node of a cluster of `nodes` nodes.
    pub fn all(nodes: usize) -> impl Iterator<Item = Topology> {
        (0..nodes).map(move |node| Topology { nodes, node })
    }

    pub fn is_multi_node(&self) -> bool {
        self.nodes > 1
    }
}
