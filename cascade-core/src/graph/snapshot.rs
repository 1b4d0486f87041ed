//! Serializable view of a graph, for diagnostics.

use serde::Serialize;

use super::port::{CacheStatus, Cardinality, PortSpec};
use super::Graph;
use crate::value::{Value, ValueKind};

/// Point-in-time dump of every node, port and edge.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub name: String,
    pub type_name: String,
    pub permanent: bool,
    pub recomputes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub inputs: Vec<PortSnapshot>,
    pub outputs: Vec<PortSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortSnapshot {
    pub name: String,
    pub cardinality: Cardinality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
    pub status: CacheStatus,
    pub value: Value,
    /// Producers for inputs, consumers for outputs.
    pub links: Vec<String>,
}

impl PortSnapshot {
    fn new(spec: &PortSpec, status: CacheStatus, value: &Value, links: Vec<String>) -> Self {
        Self {
            name: spec.name.clone(),
            cardinality: spec.cardinality,
            kind: spec.kind,
            status,
            value: value.clone(),
            links,
        }
    }
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// The snapshot of the node with the given display name.
    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.name == name)
    }
}

impl Graph {
    /// Capture the current state of every node without recomputing anything.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .node_ids()
            .into_iter()
            .filter_map(|id| {
                let slot = self.slot(id)?;
                let inputs = slot
                    .schema
                    .inputs()
                    .zip(&slot.inputs)
                    .map(|(spec, port)| {
                        let links = port.producers.iter().map(ToString::to_string).collect();
                        PortSnapshot::new(spec, port.cell.status, &port.cell.value, links)
                    })
                    .collect();
                let outputs = slot
                    .schema
                    .outputs()
                    .zip(&slot.outputs)
                    .map(|(spec, port)| {
                        let links = port.consumers.iter().map(ToString::to_string).collect();
                        PortSnapshot::new(spec, port.cell.status, &port.cell.value, links)
                    })
                    .collect();
                Some(NodeSnapshot {
                    id: id.to_string(),
                    name: slot.name.clone(),
                    type_name: slot.schema.type_name.clone(),
                    permanent: slot.permanent,
                    recomputes: slot.recomputes,
                    last_error: slot.last_error.clone(),
                    inputs,
                    outputs,
                })
            })
            .collect();
        GraphSnapshot { nodes }
    }
}
