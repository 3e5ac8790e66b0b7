//! Edges: the immutable binding of one output endpoint to one input endpoint.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::error::Result;

/// A directed conduit from one output endpoint to one input endpoint.
///
/// Edges are immutable once created; to reroute, remove and reconnect. The edge
/// itself holds only non-owning ([`Weak`]) references into its endpoints; the
/// strong owner of the endpoints is the node that created them, and the strong
/// owner of the edge itself is the graph's edge registry (see `DESIGN.md` for the
/// full ownership argument). An edge whose endpoint has since been dropped treats
/// any transfer as a no-op rather than panicking.
pub struct Edge {
    id: String,
    source_node: String,
    source_port: String,
    target_node: String,
    target_port: String,
    source: Weak<Endpoint>,
    target: Weak<Endpoint>,
}

impl Edge {
    pub(crate) fn new(source: &Arc<Endpoint>, target: &Arc<Endpoint>) -> Self {
        let id = Self::canonical_id(source.node_id(), source.id(), target.node_id(), target.id());
        Self {
            id,
            source_node: source.node_id().to_string(),
            source_port: source.id().to_string(),
            target_node: target.node_id().to_string(),
            target_port: target.id().to_string(),
            source: Arc::downgrade(source),
            target: Arc::downgrade(target),
        }
    }

    /// `"<srcNode>.<srcPort>-><tgtNode>.<tgtPort>"`, this edge's stable identity.
    pub fn canonical_id(src_node: &str, src_port: &str, tgt_node: &str, tgt_port: &str) -> String {
        format!("{src_node}.{src_port}->{tgt_node}.{tgt_port}")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_node(&self) -> &str {
        &self.source_node
    }

    pub fn source_port(&self) -> &str {
        &self.source_port
    }

    pub fn target_node(&self) -> &str {
        &self.target_node
    }

    pub fn target_port(&self) -> &str {
        &self.target_port
    }

    /// The upstream output endpoint, if it is still alive.
    pub fn source(&self) -> Option<Arc<Endpoint>> {
        self.source.upgrade()
    }

    /// The downstream input endpoint, if it is still alive.
    pub fn target(&self) -> Option<Arc<Endpoint>> {
        self.target.upgrade()
    }

    /// Deliver `value` to this edge's target by calling its `push_data`. A target
    /// that has been dropped is treated as a no-op.
    pub async fn transfer_data(&self, value: Value) -> Result<()> {
        match self.target() {
            Some(target) => target.push_data(value).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{DataFlowMode, EndpointKind};

    #[tokio::test]
    async fn canonical_id_matches_format() {
        let source = Arc::new(Endpoint::new("a", "out", EndpointKind::Output, DataFlowMode::Push));
        let target = Arc::new(Endpoint::new("b", "in", EndpointKind::Input, DataFlowMode::Push));
        let edge = Edge::new(&source, &target);
        assert_eq!(edge.id(), "a.out->b.in");
    }

    #[tokio::test]
    async fn transfer_data_pushes_into_target() {
        let source = Arc::new(Endpoint::new("a", "out", EndpointKind::Output, DataFlowMode::Push));
        let target = Arc::new(Endpoint::new("b", "in", EndpointKind::Input, DataFlowMode::Push));
        let edge = Edge::new(&source, &target);
        edge.transfer_data(Value::from(7)).await.unwrap();
        assert_eq!(target.pull_data().await.unwrap(), Some(Value::from(7)));
    }

    #[tokio::test]
    async fn transfer_data_to_dropped_target_is_a_no_op() {
        let source = Arc::new(Endpoint::new("a", "out", EndpointKind::Output, DataFlowMode::Push));
        let target = Arc::new(Endpoint::new("b", "in", EndpointKind::Input, DataFlowMode::Push));
        let edge = Edge::new(&source, &target);
        drop(target);
        assert!(edge.transfer_data(Value::from(1)).await.is_ok());
    }
}
