//! Error types for graph construction, endpoint transport, and execution.
//!
//! All errors implement `std::error::Error` via `thiserror`. There is no retry or
//! recovery logic here; this module only names the failure modes, and callers decide
//! what to do with them (see the scheduler's failure semantics in [`crate::graph`]).

use thiserror::Error;

use crate::endpoint::DataFlowMode;

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// All errors raised by the scheduler, the endpoint/edge transport layer, and the
/// addressable priority queue.
#[derive(Error, Debug)]
pub enum GraphError {
    /// `add_node` was called with an id already present in the graph.
    #[error("node '{0}' already exists in this graph")]
    DuplicateId(String),

    /// A node id referenced by `connect`, `remove_node`, or a lookup does not exist.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// An edge id referenced by `remove_edge` does not exist.
    #[error("unknown edge '{0}'")]
    UnknownEdge(String),

    /// A port id referenced on an existing node does not exist.
    #[error("node '{node}' has no port '{port}'")]
    UnknownPort {
        /// The node that was looked up.
        node: String,
        /// The missing port id.
        port: String,
    },

    /// `connect` was asked to join two endpoints that cannot be joined (same
    /// direction, e.g. two inputs or two outputs).
    #[error("endpoints '{a}' and '{b}' cannot be connected: both must be one input and one output")]
    IncompatibleEndpoints {
        /// First endpoint, as `"<node>.<port>"`.
        a: String,
        /// Second endpoint, as `"<node>.<port>"`.
        b: String,
    },

    /// An operation was attempted against an endpoint in the wrong [`DataFlowMode`].
    #[error("endpoint '{endpoint}' is in {actual:?} mode, operation requires {expected:?}")]
    ModeMismatch {
        /// The endpoint, as `"<node>.<port>"`.
        endpoint: String,
        /// The mode the operation needed.
        expected: DataFlowMode,
        /// The mode the endpoint is actually in.
        actual: DataFlowMode,
    },

    /// `AddressableHeap::decrease` was called with a value that is not
    /// less-than-or-equal-to the element's current value.
    #[error("decrease() requires a value less than or equal to the current one")]
    InvalidDecrease,

    /// `AddressableHeap` operation was given a handle that no longer refers to a
    /// live element (already deleted, or extracted via `poll`).
    #[error("heap handle does not refer to a live element")]
    StaleHandle,

    /// A node's `run` returned an error. This aborts the in-flight `execute()` call;
    /// see [`crate::graph::Graph::execute`].
    #[error("node '{node}' execution failed: {source}")]
    NodeExecution {
        /// The node whose `run` returned an error.
        node: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl GraphError {
    /// Build an [`GraphError::UnknownNode`].
    pub fn unknown_node(id: impl Into<String>) -> Self {
        Self::UnknownNode(id.into())
    }

    /// Build an [`GraphError::UnknownEdge`].
    pub fn unknown_edge(id: impl Into<String>) -> Self {
        Self::UnknownEdge(id.into())
    }

    /// Build an [`GraphError::UnknownPort`].
    pub fn unknown_port(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self::UnknownPort { node: node.into(), port: port.into() }
    }

    /// Build an [`GraphError::NodeExecution`] from any boxable error.
    pub fn node_execution(
        node: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::NodeExecution { node: node.into(), source: source.into() }
    }
}
