//! The node contract: ports, lifecycle state, and cooperative cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::NodeContext;
use crate::endpoint::{DataFlowMode, Endpoint, EndpointKind};
use crate::error::Result;

/// A cooperative cancellation flag, cheap to clone and share.
///
/// The scheduler never terminates a running node's `run` forcefully; it only sets
/// this flag and leaves it to `run` to observe at its own await points.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a node sits in the state machine of §4.4: `Pending ->[Ready ->[Running
/// ->[Completed|Failed]]]`, with `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed | NodeState::Cancelled)
    }
}

/// The user-overridable half of a node: "what does this unit of work do".
///
/// Everything else (ports, priority, lifecycle state, cancellation) lives on
/// [`Node`] itself, which every behavior is wrapped in uniformly. Implement this
/// directly for a struct-based node, or use [`Node::from_fn`] for a closure.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    async fn run(&self, ctx: &mut NodeContext) -> Result<()>;
}

type ClosureFn = Arc<dyn for<'a> Fn(&'a mut NodeContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;

struct ClosureBehavior(ClosureFn);

#[async_trait]
impl NodeBehavior for ClosureBehavior {
    async fn run(&self, ctx: &mut NodeContext) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// A vertex in the dataflow graph: a stable id, scheduling metadata, a fixed set of
/// input/output ports, lifecycle state, and the user-supplied [`NodeBehavior`] that
/// runs when dispatched.
///
/// Ports are added with [`Node::add_input_endpoint`]/[`Node::add_output_endpoint`]
/// before the node is handed to [`crate::graph::Graph::add_node`]; once added to a
/// graph, a node's port set is fixed for its lifetime (§3).
pub struct Node {
    id: String,
    priority: i64,
    cost: u64,
    timeout_ms: u64,
    retries: u32,
    metadata: HashMap<String, Value>,
    inputs: Vec<(String, Arc<Endpoint>)>,
    outputs: Vec<(String, Arc<Endpoint>)>,
    state: Mutex<NodeState>,
    cancellation: Mutex<Option<CancellationToken>>,
    behavior: Arc<dyn NodeBehavior>,
    insertion_seq: OnceLock<u64>,
}

impl Node {
    /// Construct a node around an explicit [`NodeBehavior`] implementation.
    pub fn new(id: impl Into<String>, behavior: Arc<dyn NodeBehavior>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            cost: 1,
            timeout_ms: 30_000,
            retries: 0,
            metadata: HashMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            state: Mutex::new(NodeState::Pending),
            cancellation: Mutex::new(None),
            behavior,
            insertion_seq: OnceLock::new(),
        }
    }

    /// Construct a node around a plain async closure, the common case for
    /// sources, transforms, and sinks that don't need their own type.
    pub fn from_fn<F>(id: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut NodeContext) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self::new(id, Arc::new(ClosureBehavior(Arc::new(f))))
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Add an input port. Fails to compile into a meaningful graph unless called
    /// before the node is handed to [`crate::graph::Graph::add_node`].
    pub fn add_input_endpoint(mut self, port_id: impl Into<String>, mode: DataFlowMode) -> Self {
        let port_id = port_id.into();
        let endpoint = Arc::new(Endpoint::new(self.id.clone(), port_id.clone(), EndpointKind::Input, mode));
        self.inputs.push((port_id, endpoint));
        self
    }

    /// Add an output port. See [`Node::add_input_endpoint`].
    pub fn add_output_endpoint(mut self, port_id: impl Into<String>, mode: DataFlowMode) -> Self {
        let port_id = port_id.into();
        let endpoint = Arc::new(Endpoint::new(self.id.clone(), port_id.clone(), EndpointKind::Output, mode));
        self.outputs.push((port_id, endpoint));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn input_endpoint(&self, port_id: &str) -> Option<&Arc<Endpoint>> {
        self.inputs.iter().find(|(id, _)| id == port_id).map(|(_, e)| e)
    }

    pub fn output_endpoint(&self, port_id: &str) -> Option<&Arc<Endpoint>> {
        self.outputs.iter().find(|(id, _)| id == port_id).map(|(_, e)| e)
    }

    pub fn input_endpoints(&self) -> &[(String, Arc<Endpoint>)] {
        &self.inputs
    }

    pub fn output_endpoints(&self) -> &[(String, Arc<Endpoint>)] {
        &self.outputs
    }

    /// Count of incoming edges across all input ports, the `Default` policy's
    /// secondary sort key (§4.5).
    pub fn in_degree(&self) -> usize {
        self.inputs.iter().map(|(_, e)| e.edges().len()).sum()
    }

    /// Count of outgoing edges across all output ports.
    pub fn out_degree(&self) -> usize {
        self.outputs.iter().map(|(_, e)| e.edges().len()).sum()
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().expect("node lock poisoned")
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        *self.state.lock().expect("node lock poisoned") = state;
    }

    /// The readiness predicate of §4.4. Only meaningful while the node is
    /// `Pending`; the scheduler is the only caller that needs this distinction, by
    /// construction (it only evaluates readiness for `Pending` nodes).
    pub fn is_ready(&self) -> bool {
        if self.inputs.is_empty() {
            return true;
        }
        self.inputs.iter().all(|(_, endpoint)| {
            let edges = endpoint.edges();
            if edges.is_empty() {
                return true;
            }
            match endpoint.mode() {
                DataFlowMode::Push => endpoint.has_data(),
                DataFlowMode::Pull => endpoint.upstream_has_data(),
            }
        })
    }

    /// Signal this node's cancellation token (if it is currently `Running`) and
    /// move it to `Cancelled`. Cancellation is cooperative, see
    /// [`CancellationToken`].
    pub fn cancel(&self) {
        if let Some(token) = self.cancellation.lock().expect("node lock poisoned").as_ref() {
            token.cancel();
        }
        self.set_state(NodeState::Cancelled);
    }

    pub(crate) fn insertion_seq(&self) -> Option<u64> {
        self.insertion_seq.get().copied()
    }

    /// Record this node's position in `add_node` call order. Set at most once; the
    /// [`crate::policy::TemporalPolicy`] relies on it.
    pub(crate) fn set_insertion_seq(&self, seq: u64) {
        let _ = self.insertion_seq.set(seq);
    }

    /// Run this node to completion against an already-built context: set
    /// `Running`, invoke the behavior, and record the terminal state on exit.
    /// Always clears the cancellation slot on the way out, matching §4.4's
    /// "on all exit paths releases the cancellation source".
    ///
    /// A node whose token was signalled mid-run (via [`Node::cancel`], e.g. from
    /// `remove_node`) lands on `Cancelled` regardless of what `run` itself
    /// returned, and the error, if any, is swallowed: a deliberate removal is
    /// not a scheduler failure.
    pub(crate) async fn run_with(&self, mut ctx: NodeContext) -> Result<()> {
        let token = ctx.cancellation_token().clone();
        *self.cancellation.lock().expect("node lock poisoned") = Some(token.clone());
        self.set_state(NodeState::Running);
        let result = self.behavior.run(&mut ctx).await;
        *self.cancellation.lock().expect("node lock poisoned") = None;
        if token.is_cancelled() {
            self.set_state(NodeState::Cancelled);
            return Ok(());
        }
        self.set_state(if result.is_ok() { NodeState::Completed } else { NodeState::Failed });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_op_node(id: &str) -> Node {
        Node::from_fn(id, |_ctx| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn defaults_match_spec() {
        let node = no_op_node("n");
        assert_eq!(node.priority(), 0);
        assert_eq!(node.cost(), 1);
        assert_eq!(node.timeout_ms(), 30_000);
        assert_eq!(node.retries(), 0);
        assert_eq!(node.state(), NodeState::Pending);
    }

    #[test]
    fn node_with_no_inputs_is_always_ready() {
        let node = no_op_node("source");
        assert!(node.is_ready());
    }

    #[test]
    fn node_with_unconnected_input_is_ready() {
        let node = no_op_node("n").add_input_endpoint("in", DataFlowMode::Push);
        assert!(node.is_ready());
    }

    #[test]
    fn node_with_connected_push_input_waits_for_data() {
        let node = no_op_node("n").add_input_endpoint("in", DataFlowMode::Push);
        let input = node.input_endpoint("in").unwrap().clone();
        let output = Arc::new(Endpoint::new("up", "out", EndpointKind::Output, DataFlowMode::Push));
        let edge = Arc::new(crate::edge::Edge::new(&output, &input));
        input.attach_edge(edge);
        assert!(!node.is_ready());
    }

    #[tokio::test]
    async fn run_with_transitions_through_running_to_completed() {
        let node = no_op_node("n");
        let ctx = NodeContext::new("n", HashMap::new(), CancellationToken::new(), vec![]);
        node.run_with(ctx).await.unwrap();
        assert_eq!(node.state(), NodeState::Completed);
    }

    #[tokio::test]
    async fn run_with_records_failed_on_error() {
        let node = Node::from_fn("n", |_ctx| {
            Box::pin(async { Err(crate::error::GraphError::node_execution("n", "boom")) })
        });
        let ctx = NodeContext::new("n", HashMap::new(), CancellationToken::new(), vec![]);
        let result = node.run_with(ctx).await;
        assert!(result.is_err());
        assert_eq!(node.state(), NodeState::Failed);
    }

    #[test]
    fn cancel_signals_token_and_sets_state() {
        let node = no_op_node("n");
        let token = CancellationToken::new();
        *node.cancellation.lock().unwrap() = Some(token.clone());
        node.set_state(NodeState::Running);
        node.cancel();
        assert!(token.is_cancelled());
        assert_eq!(node.state(), NodeState::Cancelled);
    }
}
