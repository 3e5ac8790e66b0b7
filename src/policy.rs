//! Scheduling policies: how a ready node's rank in the dispatch queue is computed.
//!
//! A policy is consulted exactly once per node, at the moment it becomes `Ready`
//! and is inserted into the queue (§4.5's "re-ordering occurs only at enqueue
//! time" (the heap never re-derives a rank for an element already inside it).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::node::Node;

/// A node's position in the ready queue, smallest sorts first (dispatched soonest).
///
/// Ordered lexicographically over its fields, so the field order here *is* the
/// tie-break order: ties on the first field fall through to the second, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey(pub i64, pub i64, pub i64);

/// Computes a [`RankKey`] for a node as it enters the ready queue.
///
/// Implementations may also hook [`SchedulingPolicy::on_node_added`] to capture
/// state (e.g. an insertion sequence) at the moment a node joins the graph, well
/// before it is ever ranked.
pub trait SchedulingPolicy: Send + Sync {
    fn rank(&self, node: &Node) -> RankKey;

    /// Called once, when `node` is added to the graph via
    /// [`crate::graph::Graph::add_node`]. The default does nothing; policies that
    /// need to stamp state on the node (see [`TemporalPolicy`]) override it.
    fn on_node_added(&self, _node: &Node) {}
}

/// Ranks by explicit priority (lower first), then by in-degree (fewer connected
/// inputs first), then by cost (cheaper first): the `Default` policy of §4.5.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl SchedulingPolicy for DefaultPolicy {
    fn rank(&self, node: &Node) -> RankKey {
        RankKey(node.priority(), node.in_degree() as i64, node.cost() as i64)
    }
}

/// Ranks purely by the order nodes were added to the graph (first added, first
/// dispatched), ignoring priority, degree, and cost entirely.
#[derive(Debug, Default)]
pub struct TemporalPolicy {
    next_seq: AtomicU64,
}

impl SchedulingPolicy for TemporalPolicy {
    fn rank(&self, node: &Node) -> RankKey {
        let seq = node.insertion_seq().unwrap_or(0);
        RankKey(seq as i64, 0, 0)
    }

    fn on_node_added(&self, node: &Node) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        node.set_insertion_seq(seq);
    }
}
