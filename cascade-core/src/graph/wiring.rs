//! Wiring: the write path.
//!
//! Every write to an input port (a literal or a new producer edge) ends by
//! invalidating whatever depends on that input.

use smallvec::SmallVec;

use super::node::NodeId;
use super::port::{group_literal, Cardinality, Cell, InputRef, OutputRef, PortRef};
use super::Graph;
use crate::config::CyclePolicy;
use crate::error::GraphError;
use crate::value::{NullValue, Value};

/// Something that can be assigned into an input port.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A value stored directly in the port.
    Literal(Value),
    /// Another node's output, connected by an edge.
    Port(OutputRef),
}

impl From<OutputRef> for Source {
    fn from(output: OutputRef) -> Self {
        Source::Port(output)
    }
}

macro_rules! literal_source {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Source {
                fn from(value: $ty) -> Self {
                    Source::Literal(value.into())
                }
            }
        )*
    };
}

literal_source!(Value, NullValue, bool, i32, i64, f64, &str, String, Vec<Value>);

impl Graph {
    /// Assign a literal or another node's output to `input`.
    ///
    /// Connecting an output detaches every existing producer first, on
    /// sibling ports too; use [`Graph::append`] to add a producer instead.
    pub fn assign(&mut self, input: InputRef, source: impl Into<Source>) -> Result<(), GraphError> {
        match source.into() {
            Source::Literal(value) => self.set_literal(input, value),
            Source::Port(output) => self.connect(output, input),
        }
    }

    /// Store a literal in `input`, replacing any producers.
    pub fn set_literal(&mut self, input: InputRef, value: Value) -> Result<(), GraphError> {
        let policy = self.config.type_policy;
        let slot = self.try_slot(input.node)?;
        let spec = slot
            .input_spec(input.index)
            .ok_or_else(|| GraphError::InvalidPort(input.into()))?;
        let port = PortRef::from(input);
        let value = match spec.cardinality {
            Cardinality::Single => policy.admit(port, spec.kind, value)?,
            Cardinality::Sibling => {
                let items = match group_literal(value) {
                    Value::List(items) => items,
                    single => vec![single],
                };
                let items = items
                    .into_iter()
                    .map(|item| policy.admit(port, spec.kind, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::List(items)
            }
        };

        self.detach_all(input);
        if let Some(port) = self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        {
            port.cell = Cell::fresh(value);
        }
        tracing::debug!(%input, "assigned literal");
        self.cascade_outputs(input.node);
        Ok(())
    }

    /// Make `output` the only producer of `input`.
    pub fn connect(&mut self, output: OutputRef, input: InputRef) -> Result<(), GraphError> {
        self.check_edge(output, input)?;
        self.detach_all(input);
        self.attach(output, input);
        tracing::debug!(%output, %input, "connected");
        self.invalidate_rewired(input);
        Ok(())
    }

    /// Add `output` as the last producer of the sibling port `input`.
    pub fn append(&mut self, output: OutputRef, input: InputRef) -> Result<(), GraphError> {
        let slot = self.try_slot(input.node)?;
        let spec = slot
            .input_spec(input.index)
            .ok_or_else(|| GraphError::InvalidPort(input.into()))?;
        if spec.cardinality != Cardinality::Sibling {
            return Err(GraphError::NotSibling(input.into()));
        }
        self.check_edge(output, input)?;
        self.attach(output, input);
        tracing::debug!(%output, %input, "appended producer");
        self.invalidate_rewired(input);
        Ok(())
    }

    /// Remove the edge from `output` to `input`.
    ///
    /// If `output` was attached more than once, only its first occurrence is
    /// removed. An input left without producers falls back to its default.
    pub fn detach(&mut self, output: OutputRef, input: InputRef) -> Result<(), GraphError> {
        let not_connected = || GraphError::NotConnected {
            output: output.into(),
            input: input.into(),
        };
        let slot = self.try_slot_mut(input.node)?;
        let port = slot
            .inputs
            .get_mut(input.index)
            .ok_or_else(|| GraphError::InvalidPort(input.into()))?;
        let position = port
            .producers
            .iter()
            .position(|p| *p == output)
            .ok_or_else(not_connected)?;
        port.producers.remove(position);
        let orphaned = port.producers.is_empty();

        self.unlink_consumer(output, input);
        tracing::debug!(%output, %input, "detached");

        if orphaned {
            self.reset_to_fallback(input, "has no value");
            self.cascade_outputs(input.node);
        } else {
            self.invalidate_rewired(input);
        }
        Ok(())
    }

    /// Remove a node from the graph.
    ///
    /// Consumers of its outputs are invalidated and keep dangling producer
    /// handles, which resolve to nothing on the next pull.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let consumers: Vec<InputRef> = self
            .try_slot(id)?
            .outputs
            .iter()
            .flat_map(|port| port.consumers.iter().copied())
            .collect();
        for input in consumers {
            self.invalidate_rewired(input);
        }

        let Some(slot) = self.free_slot(id) else {
            return Err(GraphError::StaleNode(id));
        };
        for (index, port) in slot.inputs.iter().enumerate() {
            for producer in &port.producers {
                self.unlink_consumer(*producer, InputRef { node: id, index });
            }
        }
        tracing::debug!(node = %id, name = %slot.name, "removed node");
        Ok(())
    }

    fn check_edge(&self, output: OutputRef, input: InputRef) -> Result<(), GraphError> {
        let producer = self.try_slot(output.node)?;
        let out_spec = producer
            .output_spec(output.index)
            .ok_or_else(|| GraphError::InvalidPort(output.into()))?;
        let consumer = self.try_slot(input.node)?;
        let in_spec = consumer
            .input_spec(input.index)
            .ok_or_else(|| GraphError::InvalidPort(input.into()))?;

        if let (Some(expected), Some(found)) = (in_spec.kind, out_spec.kind) {
            if !self.config.type_policy.compatible(Some(found), Some(expected)) {
                return Err(GraphError::TypeMismatch {
                    port: input.into(),
                    expected,
                    found,
                });
            }
        }

        if self.config.cycle_policy == CyclePolicy::Reject
            && self.reaches(input.node, output.node)
        {
            return Err(GraphError::Cycle {
                output: output.into(),
                input: input.into(),
            });
        }
        Ok(())
    }

    /// Whether `target` is `from` or lies downstream of it.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(slot) = self.slot(id) {
                for port in &slot.outputs {
                    stack.extend(port.consumers.iter().map(|input| input.node));
                }
            }
        }
        false
    }

    fn attach(&mut self, output: OutputRef, input: InputRef) {
        if let Some(port) = self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        {
            port.producers.push(output);
        }
        if let Some(port) = self
            .slot_mut(output.node)
            .and_then(|slot| slot.outputs.get_mut(output.index))
        {
            port.consumers.push(input);
        }
    }

    /// Drop every producer edge of `input`.
    fn detach_all(&mut self, input: InputRef) {
        let producers: SmallVec<[OutputRef; 1]> = match self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        {
            Some(port) => std::mem::take(&mut port.producers),
            None => return,
        };
        for output in producers {
            self.unlink_consumer(output, input);
        }
    }

    /// Remove one occurrence of `input` from `output`'s consumer list.
    fn unlink_consumer(&mut self, output: OutputRef, input: InputRef) {
        if let Some(port) = self
            .slot_mut(output.node)
            .and_then(|slot| slot.outputs.get_mut(output.index))
        {
            if let Some(position) = port.consumers.iter().position(|c| *c == input) {
                port.consumers.remove(position);
            }
        }
    }

    pub(crate) fn reset_to_fallback(&mut self, input: InputRef, reason: &str) {
        let Some(slot) = self.slot_mut(input.node) else {
            return;
        };
        let Some(value) = slot.input_spec(input.index).map(|spec| spec.fallback(reason)) else {
            return;
        };
        if let Some(port) = slot.inputs.get_mut(input.index) {
            port.cell = Cell::fresh(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, TypePolicy};
    use crate::error::CalcError;
    use crate::graph::{Args, CacheStatus, Node, NodeSchema, Outputs, PortSpec};
    use crate::value::ValueKind;

    struct Sum;

    impl Node for Sum {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("Sum")
                .input(PortSpec::new("terms").siblings().kind(ValueKind::Float))
                .input(PortSpec::new("offset").kind(ValueKind::Float).default_value(0.0))
                .output(PortSpec::new("total").kind(ValueKind::Float))
        }

        fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
            let mut total = args.float(1)?;
            for term in args.group(0)? {
                total += term.as_float().ok_or("term is not a number")?;
            }
            Ok(Value::Float(total).into())
        }
    }

    struct Label;

    impl Node for Label {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("Label")
                .input(PortSpec::new("text").kind(ValueKind::Text))
                .output(PortSpec::new("text").kind(ValueKind::Text))
        }

        fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
            Ok(Value::from(args.text(0)?).into())
        }
    }

    fn ports(graph: &Graph, id: NodeId) -> (InputRef, InputRef, OutputRef) {
        (
            graph.input(id, "terms").unwrap(),
            graph.input(id, "offset").unwrap(),
            graph.output(id, "total").unwrap(),
        )
    }

    #[test]
    fn connect_replaces_existing_producer() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let c = graph.add_node(Sum);
        let (_, c_offset, _) = ports(&graph, c);
        let a_total = graph.output(a, "total").unwrap();
        let b_total = graph.output(b, "total").unwrap();

        graph.assign(c_offset, a_total).unwrap();
        graph.assign(c_offset, b_total).unwrap();

        assert_eq!(graph.producers(c_offset).unwrap(), vec![b_total]);
        assert!(graph.consumers(a_total).unwrap().is_empty());
        assert_eq!(graph.consumers(b_total).unwrap(), vec![c_offset]);
    }

    #[test]
    fn literal_detaches_producers_and_is_fresh() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let (_, b_offset, _) = ports(&graph, b);
        let a_total = graph.output(a, "total").unwrap();

        graph.assign(b_offset, a_total).unwrap();
        assert_eq!(graph.status(b_offset), Some(CacheStatus::Stale));

        graph.assign(b_offset, 2.5).unwrap();
        assert!(graph.producers(b_offset).unwrap().is_empty());
        assert_eq!(graph.status(b_offset), Some(CacheStatus::Fresh));
        assert_eq!(graph.input_value(b_offset).unwrap(), &Value::Float(2.5));
    }

    #[test]
    fn append_requires_sibling_port() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let (b_terms, b_offset, _) = ports(&graph, b);
        let a_total = graph.output(a, "total").unwrap();

        graph.append(a_total, b_terms).unwrap();
        graph.append(a_total, b_terms).unwrap();
        assert_eq!(graph.producers(b_terms).unwrap().len(), 2);

        assert_eq!(
            graph.append(a_total, b_offset),
            Err(GraphError::NotSibling(b_offset.into()))
        );
    }

    #[test]
    fn detach_unknown_edge_fails() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let (b_terms, _, _) = ports(&graph, b);
        let a_total = graph.output(a, "total").unwrap();

        assert!(matches!(
            graph.detach(a_total, b_terms),
            Err(GraphError::NotConnected { .. })
        ));
    }

    #[test]
    fn detaching_last_producer_restores_default() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let (_, b_offset, _) = ports(&graph, b);
        let a_total = graph.output(a, "total").unwrap();

        graph.assign(b_offset, a_total).unwrap();
        graph.detach(a_total, b_offset).unwrap();
        assert_eq!(graph.input_value(b_offset).unwrap(), &Value::Float(0.0));
        assert_eq!(graph.status(b_offset), Some(CacheStatus::Fresh));
    }

    #[test]
    fn reject_policy_refuses_mismatched_literal() {
        let mut graph = Graph::new();
        let id = graph.add_node(Sum);
        let (terms, offset, _) = ports(&graph, id);

        let err = graph.assign(offset, "three").unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
        assert_eq!(graph.input_value(offset).unwrap(), &Value::Float(0.0));

        assert!(graph.assign(terms, vec![Value::Float(1.0), Value::Int(2)]).is_err());
    }

    #[test]
    fn coerce_policy_converts_literals() {
        let mut graph = Graph::with_config(
            EngineConfig::default().with_type_policy(TypePolicy::Coerce),
        );
        let id = graph.add_node(Sum);
        let (terms, offset, _) = ports(&graph, id);

        graph.assign(offset, 3).unwrap();
        assert_eq!(graph.input_value(offset).unwrap(), &Value::Float(3.0));

        graph.assign(terms, 1).unwrap();
        assert_eq!(
            graph.input_value(terms).unwrap(),
            &Value::List(vec![Value::Float(1.0)])
        );
    }

    #[test]
    fn mismatched_edge_is_refused() {
        let mut graph = Graph::new();
        let sum = graph.add_node(Sum);
        let label = graph.add_node(Label);
        let total = graph.output(sum, "total").unwrap();
        let text = graph.input(label, "text").unwrap();

        assert!(matches!(
            graph.connect(total, text),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert!(graph.producers(text).unwrap().is_empty());

        let mut coercing = Graph::with_config(
            EngineConfig::default().with_type_policy(TypePolicy::Coerce),
        );
        let sum = coercing.add_node(Sum);
        let label = coercing.add_node(Label);
        let total = coercing.output(sum, "total").unwrap();
        let text = coercing.input(label, "text").unwrap();
        assert!(coercing.connect(total, text).is_ok());
    }

    #[test]
    fn remove_node_unlinks_its_inputs() {
        let mut graph = Graph::new();
        let a = graph.add_node(Sum);
        let b = graph.add_node(Sum);
        let (b_terms, _, _) = ports(&graph, b);
        let a_total = graph.output(a, "total").unwrap();

        graph.append(a_total, b_terms).unwrap();
        graph.remove_node(b).unwrap();

        assert!(graph.consumers(a_total).unwrap().is_empty());
        assert_eq!(graph.remove_node(b), Err(GraphError::StaleNode(b)));
    }
}
