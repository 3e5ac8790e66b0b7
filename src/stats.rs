//! Point-in-time snapshots of a graph's size and execution state.

use crate::node::NodeState;

/// A snapshot of graph shape and node lifecycle counts, as returned by
/// [`crate::graph::Graph::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub pending_nodes: usize,
    pub ready_nodes: usize,
    pub running_nodes: usize,
    pub completed_nodes: usize,
    pub failed_nodes: usize,
    pub cancelled_nodes: usize,
}

impl GraphStats {
    pub(crate) fn record(&mut self, state: NodeState) {
        match state {
            NodeState::Pending => self.pending_nodes += 1,
            NodeState::Ready => self.ready_nodes += 1,
            NodeState::Running => self.running_nodes += 1,
            NodeState::Completed => self.completed_nodes += 1,
            NodeState::Failed => self.failed_nodes += 1,
            NodeState::Cancelled => self.cancelled_nodes += 1,
        }
    }
}
