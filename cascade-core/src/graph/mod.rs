//! Dependency Graph
//!
//! This module implements the dataflow graph: nodes with named input and
//! output ports, edges between them, and the two traversals that keep port
//! caches correct.
//!
//! # Overview
//!
//! - Nodes live in an arena owned by [`Graph`] and are addressed by
//!   generation-checked [`NodeId`]s.
//! - Edges go from an output port to an input port and are stored as handles
//!   on both ends. Removing a node leaves dangling handles that resolve to
//!   nothing.
//! - Reading an output ([`Graph::pull`]) walks upstream, recomputing only
//!   nodes whose outputs are not fresh.
//! - Writing an input ([`Graph::assign`]) walks downstream, marking dependent
//!   ports stale. The walk stops at ports that are already stale, so its cost
//!   is bounded by the boundary between clean and dirty regions.
//!
//! # Design Decisions
//!
//! 1. Pull is lazy and depth-first. Nothing is recomputed until someone asks
//!    for it, and a node is computed at most once per top-level pull.
//!
//! 2. Permanent nodes (volatile sources) and everything downstream of them
//!    produce [`CacheStatus::NeverCacheable`] values: valid for the pull that
//!    produced them, recomputed by the next one.
//!
//! 3. Failures are values. A failing `calculate` turns into failure
//!    sentinels on the node's outputs and a recorded `last_error`.

mod invalidate;
mod node;
mod port;
mod pull;
mod snapshot;
mod wiring;

pub use node::{Args, AsAny, Node, NodeId, NodeSchema, Outputs};
pub use port::{CacheStatus, Cardinality, Direction, InputRef, OutputRef, PortRef, PortSpec};
pub use snapshot::{GraphSnapshot, NodeSnapshot, PortSnapshot};
pub use wiring::Source;

use slab::Slab;

use crate::config::EngineConfig;
use crate::error::GraphError;
use crate::value::Value;
use node::NodeSlot;

/// The dataflow graph.
///
/// Owns every node. Single-threaded: all operations take `&self` or
/// `&mut self` and run to completion on the calling thread. Wrap it in a lock
/// to share it (see [`crate::command`]).
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Slab<NodeSlot>,
    /// Current generation of each arena slot, bumped on removal.
    generations: Vec<u32>,
    config: EngineConfig,
}

impl Graph {
    /// Create an empty graph with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with the given settings.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Add a node, named after its type.
    pub fn add_node<N: Node>(&mut self, node: N) -> NodeId {
        let name = node.schema().type_name;
        self.add_named_node(name, node)
    }

    /// Add a node with a display name used in diagnostics.
    pub fn add_named_node<N: Node>(&mut self, name: impl Into<String>, node: N) -> NodeId {
        let slot = NodeSlot::new(name.into(), Box::new(node));
        let index = self.nodes.insert(slot);
        if index >= self.generations.len() {
            self.generations.resize(index + 1, 0);
        }
        let id = NodeId::from_raw_parts(index as u32, self.generations[index]);
        tracing::debug!(node = %id, "added node");
        id
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Handles of all live nodes, in arena order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|(index, _)| NodeId::from_raw_parts(index as u32, self.generations[index]))
            .collect()
    }

    /// Display name of a node.
    pub fn name(&self, id: NodeId) -> Result<&str, GraphError> {
        Ok(&self.try_slot(id)?.name)
    }

    /// Borrow a node as its concrete type.
    pub fn node<T: Node>(&self, id: NodeId) -> Result<&T, GraphError> {
        let slot = self.try_slot(id)?;
        (*slot.behavior)
            .as_any()
            .downcast_ref::<T>()
            .ok_or(GraphError::NodeType(id))
    }

    /// Mutably borrow a node as its concrete type.
    ///
    /// Changing internal state this way does not invalidate anything; follow
    /// up with [`Graph::refresh`] when the change affects outputs.
    pub fn node_mut<T: Node>(&mut self, id: NodeId) -> Result<&mut T, GraphError> {
        let slot = self.try_slot_mut(id)?;
        (*slot.behavior)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(GraphError::NodeType(id))
    }

    /// Look up an input port by name.
    pub fn input(&self, id: NodeId, name: &str) -> Result<InputRef, GraphError> {
        let slot = self.try_slot(id)?;
        slot.schema
            .inputs
            .get_index_of(name)
            .map(|index| InputRef { node: id, index })
            .ok_or_else(|| GraphError::UnknownPort {
                node: id,
                direction: Direction::Input.as_str(),
                name: name.to_string(),
            })
    }

    /// Look up an output port by name.
    pub fn output(&self, id: NodeId, name: &str) -> Result<OutputRef, GraphError> {
        let slot = self.try_slot(id)?;
        slot.schema
            .outputs
            .get_index_of(name)
            .map(|index| OutputRef { node: id, index })
            .ok_or_else(|| GraphError::UnknownPort {
                node: id,
                direction: Direction::Output.as_str(),
                name: name.to_string(),
            })
    }

    /// Mark a node as permanent (recomputed on every pull) or not.
    ///
    /// Clearing the flag does not make existing results fresh; the next pull
    /// recomputes once more and may then cache.
    pub fn set_permanent(&mut self, id: NodeId, permanent: bool) -> Result<(), GraphError> {
        self.try_slot_mut(id)?.permanent = permanent;
        Ok(())
    }

    pub fn is_permanent(&self, id: NodeId) -> Result<bool, GraphError> {
        Ok(self.try_slot(id)?.permanent)
    }

    /// Message of the most recent failed `calculate`, cleared by the next
    /// successful one.
    pub fn last_error(&self, id: NodeId) -> Option<&str> {
        self.slot(id)?.last_error.as_deref()
    }

    /// How many times the node's `calculate` has run.
    pub fn recompute_count(&self, id: NodeId) -> u64 {
        self.slot(id).map_or(0, |slot| slot.recomputes)
    }

    /// Cache status of a port, or `None` if the port does not exist.
    pub fn status(&self, port: impl Into<PortRef>) -> Option<CacheStatus> {
        let port = port.into();
        let slot = self.slot(port.node)?;
        match port.direction {
            Direction::Input => slot.inputs.get(port.index).map(|p| p.cell.status),
            Direction::Output => slot.outputs.get(port.index).map(|p| p.cell.status),
        }
    }

    /// Cached value of an input, without any traversal.
    pub fn input_value(&self, input: InputRef) -> Result<&Value, GraphError> {
        self.try_slot(input.node)?
            .inputs
            .get(input.index)
            .map(|port| &port.cell.value)
            .ok_or_else(|| GraphError::InvalidPort(input.into()))
    }

    /// Producers currently attached to an input, in attachment order.
    pub fn producers(&self, input: InputRef) -> Result<Vec<OutputRef>, GraphError> {
        self.try_slot(input.node)?
            .inputs
            .get(input.index)
            .map(|port| port.producers.to_vec())
            .ok_or_else(|| GraphError::InvalidPort(input.into()))
    }

    /// Consumers currently attached to an output.
    pub fn consumers(&self, output: OutputRef) -> Result<Vec<InputRef>, GraphError> {
        self.try_slot(output.node)?
            .outputs
            .get(output.index)
            .map(|port| port.consumers.clone())
            .ok_or_else(|| GraphError::InvalidPort(output.into()))
    }

    pub(crate) fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        let index = id.index() as usize;
        if self.generations.get(index) != Some(&id.generation()) {
            return None;
        }
        self.nodes.get(index)
    }

    pub(crate) fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        let index = id.index() as usize;
        if self.generations.get(index) != Some(&id.generation()) {
            return None;
        }
        self.nodes.get_mut(index)
    }

    pub(crate) fn try_slot(&self, id: NodeId) -> Result<&NodeSlot, GraphError> {
        self.slot(id).ok_or(GraphError::StaleNode(id))
    }

    pub(crate) fn try_slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot, GraphError> {
        self.slot_mut(id).ok_or(GraphError::StaleNode(id))
    }

    /// Free a node's arena slot and retire its handle.
    pub(crate) fn free_slot(&mut self, id: NodeId) -> Option<NodeSlot> {
        self.slot(id)?;
        let index = id.index() as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.nodes.try_remove(index)
    }
}
