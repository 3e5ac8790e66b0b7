//! A single-threaded, cooperative scheduler for dataflow graphs.
//!
//! A [`Graph`](graph::Graph) is a set of [`Node`](node::Node)s, each exposing
//! typed input/output [`Endpoint`](endpoint::Endpoint)s, wired together by
//! [`Edge`](edge::Edge)s. Nodes become eligible for dispatch as their inputs are
//! satisfied and run under a configurable concurrency budget, ranked by an
//! [`AddressableHeap`](heap::AddressableHeap)-backed ready queue whose ordering
//! is pluggable via [`SchedulingPolicy`](policy::SchedulingPolicy).
//!
//! ```rust,ignore
//! use dataflow_graph::graph::Graph;
//! use dataflow_graph::node::Node;
//! use dataflow_graph::endpoint::DataFlowMode;
//!
//! let graph = Graph::default();
//! graph.add_node(
//!     Node::from_fn("source", |ctx| Box::pin(async move { ctx.set_output("out", 1).await }))
//!         .add_output_endpoint("out", DataFlowMode::Push),
//! )?;
//! graph.add_node(
//!     Node::from_fn("sink", |_ctx| Box::pin(async { Ok(()) }))
//!         .add_input_endpoint("in", DataFlowMode::Push),
//! )?;
//! graph.connect("source", "out", "sink", "in")?;
//! graph.execute().await?;
//! # Ok::<(), dataflow_graph::error::GraphError>(())
//! ```
//!
//! ## Module map
//! - [`heap`] - the addressable pairing heap behind the ready queue
//! - [`endpoint`] / [`edge`] - the push/pull transport layer between nodes
//! - [`node`] - node lifecycle, cancellation, and the `NodeBehavior` contract
//! - [`context`] - the per-invocation handle passed to a running node
//! - [`policy`] - pluggable ready-queue ranking
//! - [`graph`] - node/edge registries and the scheduler loop
//! - [`stats`] - point-in-time graph snapshots
//! - [`error`] - the crate-wide error type

pub mod context;
pub mod edge;
pub mod endpoint;
pub mod error;
pub mod graph;
pub mod heap;
pub mod node;
pub mod policy;
pub mod stats;

pub use context::NodeContext;
pub use edge::Edge;
pub use endpoint::{DataFlowMode, Endpoint, EndpointKind};
pub use error::{GraphError, Result};
pub use graph::{Graph, GraphBuilder, GraphConfig};
pub use heap::{AddressableHeap, Handle, HeapError};
pub use node::{CancellationToken, Node, NodeBehavior, NodeState};
pub use policy::{DefaultPolicy, RankKey, SchedulingPolicy, TemporalPolicy};
pub use stats::GraphStats;
