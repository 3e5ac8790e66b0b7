//! The graph itself: node/edge registries, dynamic mutation, and the cooperative
//! scheduler that dispatches ready nodes under a concurrency budget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::context::NodeContext;
use crate::edge::Edge;
use crate::endpoint::Endpoint;
use crate::error::{GraphError, Result};
use crate::heap::{AddressableHeap, Handle};
use crate::node::{CancellationToken, Node, NodeState};
use crate::policy::{DefaultPolicy, RankKey, SchedulingPolicy};
use crate::stats::GraphStats;

/// Tuning knobs for a [`Graph`]'s scheduler. Built in-process via
/// [`Graph::new`]/[`Graph::builder`]; there is no environment or file-based
/// configuration layer here, unlike the crates further up this workspace.
#[derive(Clone)]
pub struct GraphConfig {
    /// Maximum number of nodes with an in-flight `run` at any one time.
    pub max_concurrency: usize,
    /// Ranks nodes as they enter the ready queue.
    pub scheduling_strategy: Arc<dyn SchedulingPolicy>,
    /// When true (the default), a node's completion re-evaluates every
    /// downstream node's readiness immediately. When false, readiness is only
    /// re-evaluated at node addition and at explicit edge removal, useful for
    /// static, pre-planned executions where the whole graph is wired up front.
    pub enable_dynamic_scheduling: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { max_concurrency: 4, scheduling_strategy: Arc::new(DefaultPolicy), enable_dynamic_scheduling: true }
    }
}

/// An entry in the ready queue: a node's rank, computed once at enqueue time, plus
/// its id as a deterministic tie-break so two nodes with an identical rank still
/// have a total order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    rank: RankKey,
    node_id: String,
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank.cmp(&other.rank).then_with(|| self.node_id.cmp(&other.node_id))
    }
}

struct GraphState {
    nodes: HashMap<String, Arc<Node>>,
    edges: HashMap<String, Arc<Edge>>,
    queue: AddressableHeap<QueueEntry>,
    handles: HashMap<String, Handle>,
    /// Set on node addition and edge removal; cleared once consumed by
    /// `promote_ready_nodes`. Ignored when `enable_dynamic_scheduling` is true,
    /// since that mode always re-promotes.
    needs_promotion: bool,
}

impl Default for GraphState {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            queue: AddressableHeap::new(),
            handles: HashMap::new(),
            needs_promotion: true,
        }
    }
}

/// A dataflow graph: a registry of [`Node`]s wired together by [`Edge`]s, plus the
/// scheduler that drives them to completion.
///
/// All mutation methods take `&self`: the node/edge registries and ready queue
/// live behind an internal lock, so a `Graph` can be shared (typically via `Arc`)
/// with node bodies that mutate the graph they themselves run in (§6, dynamic
/// graph mutation). The lock is only ever held across synchronous sections; no
/// method holds it across an `.await`.
pub struct Graph {
    state: Mutex<GraphState>,
    config: GraphConfig,
}

/// Builds a [`Graph`] with a non-default [`GraphConfig`].
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    fn new() -> Self {
        Self { config: GraphConfig::default() }
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn SchedulingPolicy>) -> Self {
        self.config.scheduling_strategy = policy;
        self
    }

    pub fn enable_dynamic_scheduling(mut self, enabled: bool) -> Self {
        self.config.enable_dynamic_scheduling = enabled;
        self
    }

    pub fn build(self) -> Graph {
        Graph::new(self.config)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new(GraphConfig::default())
    }
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        Graph { state: Mutex::new(GraphState::default()), config }
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Register `node`. Fails if a node with the same id is already present.
    pub fn add_node(&self, node: Node) -> Result<()> {
        let mut state = self.state.lock().expect("graph lock poisoned");
        if state.nodes.contains_key(node.id()) {
            return Err(GraphError::DuplicateId(node.id().to_string()));
        }
        let node = Arc::new(node);
        self.config.scheduling_strategy.on_node_added(&node);
        state.nodes.insert(node.id().to_string(), node);
        state.needs_promotion = true;
        Ok(())
    }

    /// Remove `node_id` and every edge incident to it. A node that is currently
    /// `Running` is cancelled first (§6: `remove_node` is the cancellation
    /// pathway for in-flight work), cooperatively: its `run` observes this at
    /// its own next await point.
    pub fn remove_node(&self, node_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("graph lock poisoned");
        let node = state.nodes.remove(node_id).ok_or_else(|| GraphError::unknown_node(node_id))?;

        if node.state() == NodeState::Running {
            tracing::warn!(node = node_id, "cancelling running node for removal");
            node.cancel();
        }
        if let Some(handle) = state.handles.remove(node_id) {
            let _ = state.queue.delete(handle);
        }

        let incident: Vec<String> = node
            .input_endpoints()
            .iter()
            .chain(node.output_endpoints())
            .flat_map(|(_, endpoint)| endpoint.edges())
            .map(|edge| edge.id().to_string())
            .collect();
        for edge_id in incident {
            if let Some(edge) = state.edges.remove(&edge_id) {
                if let Some(source) = edge.source() {
                    source.detach_edge(&edge_id);
                }
                if let Some(target) = edge.target() {
                    target.detach_edge(&edge_id);
                }
            }
        }
        Ok(())
    }

    /// Connect `source_node.source_port` (an output) to `target_node.target_port`
    /// (an input), returning the new edge's canonical id.
    pub fn connect(
        &self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().expect("graph lock poisoned");
        let source = state
            .nodes
            .get(source_node)
            .ok_or_else(|| GraphError::unknown_node(source_node))?
            .output_endpoint(source_port)
            .cloned()
            .ok_or_else(|| GraphError::unknown_port(source_node, source_port))?;
        let target = state
            .nodes
            .get(target_node)
            .ok_or_else(|| GraphError::unknown_node(target_node))?
            .input_endpoint(target_port)
            .cloned()
            .ok_or_else(|| GraphError::unknown_port(target_node, target_port))?;

        if !source.can_connect(&target) {
            return Err(GraphError::IncompatibleEndpoints {
                a: source.qualified_id(),
                b: target.qualified_id(),
            });
        }

        let edge = Arc::new(Edge::new(&source, &target));
        source.attach_edge(edge.clone());
        target.attach_edge(edge.clone());
        let id = edge.id().to_string();
        state.edges.insert(id.clone(), edge);
        Ok(id)
    }

    /// Remove a single edge by its canonical id, detaching it from both endpoints
    /// it was attached to.
    pub fn remove_edge(&self, edge_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("graph lock poisoned");
        let edge = state.edges.remove(edge_id).ok_or_else(|| GraphError::unknown_edge(edge_id))?;
        if let Some(source) = edge.source() {
            source.detach_edge(edge_id);
        }
        if let Some(target) = edge.target() {
            target.detach_edge(edge_id);
        }
        state.needs_promotion = true;
        Ok(())
    }

    /// Drop every node and edge, and empty the ready queue.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("graph lock poisoned");
        state.nodes.clear();
        state.edges.clear();
        state.queue.clear();
        state.handles.clear();
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.state.lock().expect("graph lock poisoned").nodes.contains_key(node_id)
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.state.lock().expect("graph lock poisoned").nodes.get(node_id).map(|n| n.state())
    }

    /// Fetch a node's input endpoint, e.g. to feed it test data without going
    /// through a connected upstream node.
    pub fn input_endpoint(&self, node_id: &str, port_id: &str) -> Result<Arc<Endpoint>> {
        let state = self.state.lock().expect("graph lock poisoned");
        let node = state.nodes.get(node_id).ok_or_else(|| GraphError::unknown_node(node_id))?;
        node.input_endpoint(port_id).cloned().ok_or_else(|| GraphError::unknown_port(node_id, port_id))
    }

    /// Fetch a node's output endpoint, e.g. to read its result after `execute`.
    pub fn output_endpoint(&self, node_id: &str, port_id: &str) -> Result<Arc<Endpoint>> {
        let state = self.state.lock().expect("graph lock poisoned");
        let node = state.nodes.get(node_id).ok_or_else(|| GraphError::unknown_node(node_id))?;
        node.output_endpoint(port_id).cloned().ok_or_else(|| GraphError::unknown_port(node_id, port_id))
    }

    /// A snapshot of graph shape and per-state node counts.
    pub fn stats(&self) -> GraphStats {
        let state = self.state.lock().expect("graph lock poisoned");
        let mut stats = GraphStats { total_nodes: state.nodes.len(), total_edges: state.edges.len(), ..Default::default() };
        for node in state.nodes.values() {
            stats.record(node.state());
        }
        stats
    }

    /// Scan every `Pending` node, promote the ones whose readiness predicate now
    /// holds to `Ready`, rank them via the configured policy, and insert them into
    /// the ready queue. Ranking happens exactly once here, at enqueue time; the
    /// heap never re-derives a rank for an element already inside it (§4.5).
    fn promote_ready_nodes(&self) {
        let mut state = self.state.lock().expect("graph lock poisoned");
        state.needs_promotion = false;
        let newly_ready: Vec<(String, Arc<Node>)> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.state() == NodeState::Pending && node.is_ready())
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();
        for (id, node) in newly_ready {
            node.set_state(NodeState::Ready);
            let rank = self.config.scheduling_strategy.rank(&node);
            let handle = state.queue.insert(QueueEntry { rank, node_id: id.clone() });
            state.handles.insert(id, handle);
        }
    }

    fn should_promote(&self) -> bool {
        self.config.enable_dynamic_scheduling || self.state.lock().expect("graph lock poisoned").needs_promotion
    }

    /// Pop the highest-ranked ready node, if any, releasing the lock before
    /// returning (callers gather its inputs with an `.await`, which must never
    /// happen while this lock is held).
    fn dequeue_next(&self) -> Option<Arc<Node>> {
        let mut state = self.state.lock().expect("graph lock poisoned");
        let entry = state.queue.poll()?;
        state.handles.remove(&entry.node_id);
        Some(state.nodes.get(&entry.node_id).expect("queued node still registered").clone())
    }

    /// Gather a dispatch-ready node's resolved inputs into a fresh [`NodeContext`].
    async fn build_context(&self, node: &Node) -> Result<NodeContext> {
        let mut inputs = HashMap::new();
        for (port_id, endpoint) in node.input_endpoints() {
            if let Some(value) = endpoint.pull_data().await? {
                inputs.insert(port_id.clone(), value);
            }
        }
        let outputs = node.output_endpoints().to_vec();
        Ok(NodeContext::new(node.id().to_string(), inputs, CancellationToken::new(), outputs))
    }

    /// Run the graph to completion: repeatedly promote ready nodes, dispatch as
    /// many as the concurrency budget allows, and await the next completion,
    /// re-promoting after each one (a completed node's outputs may have made
    /// downstream nodes ready). Stops once nothing is running and the ready queue
    /// is empty; any node still `Pending` at that point is permanently
    /// unreachable (nothing left running could ever satisfy it), rather than
    /// polled forever.
    ///
    /// A node whose `run` returns an error aborts the whole call, but does not
    /// forcibly cancel whatever else is in flight: every other already-dispatched
    /// node is still awaited to completion before the error is returned, per
    /// §4.6's "not forcibly cancelled" failure semantics (a node cancelled via
    /// [`Graph::remove_node`] is a separate, deliberate pathway, see
    /// [`Node::run_with`](crate::node::Node)).
    #[tracing::instrument(name = "graph_execute", skip(self), fields(max_concurrency = self.config.max_concurrency))]
    pub async fn execute(&self) -> Result<()> {
        let mut running: FuturesUnordered<BoxFuture<'static, (String, Result<()>)>> = FuturesUnordered::new();

        loop {
            if self.should_promote() {
                self.promote_ready_nodes();
            }

            while running.len() < self.config.max_concurrency {
                let ready_queue_len = self.state.lock().expect("graph lock poisoned").queue.len();
                let Some(node) = self.dequeue_next() else { break };
                tracing::debug!(node = node.id(), priority = node.priority(), ready_queue_len, "dequeued node");
                let ctx = match self.build_context(&node).await {
                    Ok(ctx) => ctx,
                    Err(error) => return self.drain_after_failure(running, error).await,
                };
                running.push(Box::pin(async move {
                    let id = node.id().to_string();
                    let result = node.run_with(ctx).await;
                    (id, result)
                }));
            }

            if running.is_empty() {
                break;
            }

            let (node_id, result) = running.next().await.expect("running is non-empty");
            match result {
                Ok(()) => tracing::info!(node = %node_id, "node finished"),
                Err(error) => {
                    tracing::error!(node = %node_id, %error, "node execution failed, aborting graph execution");
                    return self.drain_after_failure(running, error).await;
                }
            }
        }

        Ok(())
    }

    /// Await every still-in-flight node to completion without dispatching
    /// anything new, then return `error`. Called once `execute` has decided to
    /// abort: dropping `running` here instead would forcibly cancel whatever
    /// else was dispatched, which §4.6 explicitly forbids.
    async fn drain_after_failure(
        &self,
        mut running: FuturesUnordered<BoxFuture<'static, (String, Result<()>)>>,
        error: GraphError,
    ) -> Result<()> {
        while let Some((node_id, result)) = running.next().await {
            match result {
                Ok(()) => tracing::info!(node = %node_id, "node finished during failure drain"),
                Err(drain_error) => {
                    tracing::error!(node = %node_id, error = %drain_error, "node also failed during failure drain");
                }
            }
        }
        Err(error)
    }
}
