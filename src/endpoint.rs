//! Endpoints: the per-port buffer and transport logic that moves data across an
//! [`Edge`](crate::edge::Edge).
//!
//! An endpoint is either an [`EndpointKind::Input`] or an [`EndpointKind::Output`],
//! and independently operates in one of two [`DataFlowMode`]s. The two axes are
//! orthogonal: an input's mode governs how *it* behaves, regardless of what mode the
//! output feeding it uses.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::edge::Edge;
use crate::error::{GraphError, Result};

/// Whether an endpoint is attached to a node's input or output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Input,
    Output,
}

/// Transport discipline for one endpoint.
///
/// - `Push`: the producer drives delivery, synchronously fanning data out to
///   connected consumers.
/// - `Pull`: the consumer drives delivery, reaching upstream through its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFlowMode {
    Push,
    Pull,
}

impl Default for DataFlowMode {
    fn default() -> Self {
        DataFlowMode::Push
    }
}

/// One typed port on a node.
///
/// Endpoints are owned by their node (see [`crate::node::Node`]); the edges incident
/// to an endpoint are held here as strong references so the graph's own edge
/// registry and an endpoint's edge list are just two views onto the same
/// `Arc<Edge>`; see the ownership discussion in `DESIGN.md`.
pub struct Endpoint {
    id: String,
    node_id: String,
    kind: EndpointKind,
    mode: DataFlowMode,
    edges: Mutex<Vec<std::sync::Arc<Edge>>>,
    buffer: Mutex<VecDeque<Value>>,
    awaiters: Mutex<VecDeque<oneshot::Sender<Value>>>,
}

impl Endpoint {
    pub(crate) fn new(node_id: impl Into<String>, id: impl Into<String>, kind: EndpointKind, mode: DataFlowMode) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            kind,
            mode,
            edges: Mutex::new(Vec::new()),
            buffer: Mutex::new(VecDeque::new()),
            awaiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn mode(&self) -> DataFlowMode {
        self.mode
    }

    /// `"<node>.<port>"`, used in error messages and edge ids.
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.node_id, self.id)
    }

    /// True iff `self` and `other` are one input and one output, the only legal
    /// pairing for a [`crate::edge::Edge`]. Data-flow mode compatibility is not
    /// checked: modes are independent per endpoint.
    pub fn can_connect(&self, other: &Endpoint) -> bool {
        self.kind != other.kind
    }

    /// Snapshot of the edges currently incident to this endpoint, in the order they
    /// were attached.
    pub fn edges(&self) -> Vec<std::sync::Arc<Edge>> {
        self.edges.lock().expect("endpoint lock poisoned").clone()
    }

    pub(crate) fn attach_edge(&self, edge: std::sync::Arc<Edge>) {
        let mut edges = self.edges.lock().expect("endpoint lock poisoned");
        if !edges.iter().any(|e| e.id() == edge.id()) {
            edges.push(edge);
        }
    }

    pub(crate) fn detach_edge(&self, edge_id: &str) {
        self.edges.lock().expect("endpoint lock poisoned").retain(|e| e.id() != edge_id);
    }

    /// Whether this endpoint's own local buffer is non-empty. For a Pull-mode
    /// output this is the buffer readiness downstream Pull chains observe; for a
    /// Push-mode input this is what the readiness predicate checks directly.
    pub fn has_data(&self) -> bool {
        !self.buffer.lock().expect("endpoint lock poisoned").is_empty()
    }

    /// Push a value into this endpoint.
    ///
    /// For an [`EndpointKind::Input`]: valid only in [`DataFlowMode::Push`]. If an
    /// awaiter (from [`Endpoint::wait_for_data`]) is pending, it is resolved
    /// directly and `v` is never buffered; otherwise `v` is appended to the FIFO
    /// buffer.
    ///
    /// For an [`EndpointKind::Output`]: in `Push` mode this concurrently forwards
    /// `v` to every connected edge's target, awaiting all fan-out completions. In
    /// `Pull` mode it is appended to the local buffer for later consumption by
    /// downstream `pull_data` chains.
    pub async fn push_data(&self, value: Value) -> Result<()> {
        match self.kind {
            EndpointKind::Input => {
                if self.mode != DataFlowMode::Push {
                    return Err(GraphError::ModeMismatch {
                        endpoint: self.qualified_id(),
                        expected: DataFlowMode::Push,
                        actual: self.mode,
                    });
                }
                let waiting = self.awaiters.lock().expect("endpoint lock poisoned").pop_front();
                match waiting {
                    Some(sender) => {
                        // Receiver may already have been dropped (a cancelled wait);
                        // that is not an error for the pusher.
                        let _ = sender.send(value);
                    }
                    None => {
                        self.buffer.lock().expect("endpoint lock poisoned").push_back(value);
                    }
                }
                Ok(())
            }
            EndpointKind::Output => {
                if self.mode == DataFlowMode::Pull {
                    self.buffer.lock().expect("endpoint lock poisoned").push_back(value);
                    return Ok(());
                }
                let targets = self.edges();
                let mut sends = Vec::with_capacity(targets.len());
                for edge in &targets {
                    sends.push(edge.transfer_data(value.clone()));
                }
                for result in futures::future::join_all(sends).await {
                    result?;
                }
                Ok(())
            }
        }
    }

    /// Pull a value out of this endpoint, if one is available.
    ///
    /// For an [`EndpointKind::Input`] in `Push` mode: pops the front of the local
    /// buffer. In `Pull` mode: walks the incident edges in attachment order, calling
    /// `pull_data` on each source output endpoint and returning the first value
    /// produced (a source endpoint that is itself in the wrong mode for this
    /// operation simply contributes nothing, rather than failing the whole pull).
    ///
    /// For an [`EndpointKind::Output`]: valid only in `Pull` mode, where it pops the
    /// front of the local buffer; in `Push` mode this is a [`GraphError::ModeMismatch`].
    pub async fn pull_data(&self) -> Result<Option<Value>> {
        match self.kind {
            EndpointKind::Input => match self.mode {
                DataFlowMode::Push => Ok(self.buffer.lock().expect("endpoint lock poisoned").pop_front()),
                DataFlowMode::Pull => {
                    for edge in self.edges() {
                        if let Some(source) = edge.source() {
                            match source.pull_data().await {
                                Ok(Some(v)) => return Ok(Some(v)),
                                Ok(None) => continue,
                                Err(GraphError::ModeMismatch { .. }) => continue,
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    Ok(None)
                }
            },
            EndpointKind::Output => {
                if self.mode != DataFlowMode::Pull {
                    return Err(GraphError::ModeMismatch {
                        endpoint: self.qualified_id(),
                        expected: DataFlowMode::Pull,
                        actual: self.mode,
                    });
                }
                Ok(self.buffer.lock().expect("endpoint lock poisoned").pop_front())
            }
        }
    }

    /// Resolve with the next value delivered to this input endpoint.
    ///
    /// If a value is already buffered, resolves immediately (consuming it).
    /// Otherwise registers a new awaiter, resolved by the next `push_data`. Only
    /// meaningful for [`EndpointKind::Input`] endpoints.
    pub async fn wait_for_data(&self) -> Value {
        let buffered = self.buffer.lock().expect("endpoint lock poisoned").pop_front();
        if let Some(v) = buffered {
            return v;
        }
        let (tx, rx) = oneshot::channel();
        self.awaiters.lock().expect("endpoint lock poisoned").push_back(tx);
        rx.await.expect("push_data always resolves a registered awaiter before it is dropped")
    }

    /// True iff at least one upstream source endpoint (via this endpoint's incident
    /// edges) currently has buffered data, the Pull-mode half of the readiness
    /// predicate (see [`crate::graph::Graph`]).
    pub fn upstream_has_data(&self) -> bool {
        self.edges().iter().filter_map(|e| e.source()).any(|source| source.has_data())
    }
}
