//! The per-invocation handle passed to a node's `run`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::endpoint::Endpoint;
use crate::error::{GraphError, Result};
use crate::node::CancellationToken;

/// Read-only view of a node's resolved inputs, plus the means to cooperatively
/// observe cancellation and to emit outputs.
///
/// Built fresh by the scheduler for each dispatch (see [`crate::graph::Graph`]);
/// never reused across invocations.
pub struct NodeContext {
    node_id: String,
    inputs: HashMap<String, Value>,
    cancellation_token: CancellationToken,
    outputs: Vec<(String, Arc<Endpoint>)>,
}

impl NodeContext {
    pub(crate) fn new(
        node_id: impl Into<String>,
        inputs: HashMap<String, Value>,
        cancellation_token: CancellationToken,
        outputs: Vec<(String, Arc<Endpoint>)>,
    ) -> Self {
        Self { node_id: node_id.into(), inputs, cancellation_token, outputs }
    }

    /// The id of the node currently running.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The cancellation token for this invocation. `run` implementations that
    /// perform long-running or looping work should check
    /// [`CancellationToken::is_cancelled`] at their own await points.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Every input port's resolved value, as gathered by `pull_data` before
    /// dispatch. Absent ports (no value available) are simply not present in the map.
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Deserialize the value on `port_id`, if present and of the right shape.
    pub fn get_input<T: DeserializeOwned>(&self, port_id: &str) -> Option<T> {
        self.inputs.get(port_id).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The raw JSON value on `port_id`, if present.
    pub fn get_input_raw(&self, port_id: &str) -> Option<&Value> {
        self.inputs.get(port_id)
    }

    /// Push `value` through the named output endpoint, fanning out to every
    /// connected edge (or buffering, in Pull mode) per [`Endpoint::push_data`].
    pub async fn set_output(&self, port_id: &str, value: impl Serialize) -> Result<()> {
        let (_, endpoint) = self
            .outputs
            .iter()
            .find(|(id, _)| id == port_id)
            .ok_or_else(|| GraphError::unknown_port(&self.node_id, port_id))?;
        let json = serde_json::to_value(value)
            .map_err(|e| GraphError::node_execution(&self.node_id, e))?;
        endpoint.push_data(json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{DataFlowMode, EndpointKind};

    #[tokio::test]
    async fn get_input_deserializes_typed_value() {
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), Value::from(42));
        let ctx = NodeContext::new("n", inputs, CancellationToken::new(), vec![]);
        assert_eq!(ctx.get_input::<i64>("x"), Some(42));
        assert_eq!(ctx.get_input::<i64>("missing"), None);
    }

    #[tokio::test]
    async fn set_output_rejects_unknown_port() {
        let ctx = NodeContext::new("n", HashMap::new(), CancellationToken::new(), vec![]);
        let err = ctx.set_output("nope", 1).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownPort { .. }));
    }

    #[tokio::test]
    async fn set_output_pushes_through_matching_endpoint() {
        let ep = Arc::new(Endpoint::new("n", "out", EndpointKind::Output, DataFlowMode::Pull));
        let ctx = NodeContext::new("n", HashMap::new(), CancellationToken::new(), vec![("out".to_string(), ep.clone())]);
        ctx.set_output("out", "hello").await.unwrap();
        assert_eq!(ep.pull_data().await.unwrap(), Some(Value::from("hello")));
    }
}
