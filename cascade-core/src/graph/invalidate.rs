//! Invalidation
//!
//! The push half of the engine. After a write, everything that depends on
//! the written port is marked stale so that the next pull recomputes it.
//!
//! # Algorithm
//!
//! Breadth-first over ports, starting at the written port:
//!
//! 1. A port that is not fresh stops the walk. Everything downstream of a
//!    non-fresh port is already non-fresh, so the dirty frontier is never
//!    re-walked.
//! 2. A fresh port is marked stale.
//! 3. An input port continues into every output of its node; an output port
//!    continues into every consumer input.
//!
//! Edge changes (`connect`, `append`, `detach`, `remove_node`) force the
//! rewired input stale whatever its status and start from its node's
//! outputs. A producer-less input is set fresh again by the next pull that
//! reaches it.
//!
//! The walk recomputes nothing; that is left to the next pull.

use std::collections::{HashSet, VecDeque};

use super::node::NodeId;
use super::port::{CacheStatus, Direction, InputRef, OutputRef, PortRef};
use super::Graph;

impl Graph {
    /// Mark `port` and every transitive dependent stale.
    ///
    /// Stops at ports that are already stale or never-cacheable.
    pub fn invalidate(&mut self, port: impl Into<PortRef>) {
        let start = port.into();
        let mut queue = VecDeque::from([start]);
        let marked = self.cascade(&mut queue);
        tracing::trace!(port = %start, marked, "invalidated");
    }

    /// Force every output of `node` stale and invalidate its consumers.
    ///
    /// Used when a node's internal state changes without any new input
    /// arriving through an edge.
    pub fn refresh(&mut self, node: NodeId) {
        let Some(slot) = self.slot_mut(node) else {
            return;
        };
        let mut queue = VecDeque::new();
        for port in &mut slot.outputs {
            port.cell.status = CacheStatus::Stale;
            queue.extend(port.consumers.iter().copied().map(PortRef::from));
        }
        let marked = self.cascade(&mut queue);
        tracing::debug!(%node, marked, "refreshed");
    }

    /// Mark `input` stale whatever its current status, then invalidate
    /// everything fed by its node.
    ///
    /// Used after an edge change: the input's status says nothing about the
    /// new producer set, so it must not stop the walk.
    pub(crate) fn invalidate_rewired(&mut self, input: InputRef) {
        if let Some(port) = self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        {
            port.cell.status = CacheStatus::Stale;
        }
        self.cascade_outputs(input.node);
    }

    /// Invalidate everything fed by `node`'s outputs.
    ///
    /// Used after a literal write, which leaves the written input fresh.
    pub(crate) fn cascade_outputs(&mut self, node: NodeId) {
        let Some(slot) = self.slot(node) else {
            return;
        };
        let mut queue: VecDeque<PortRef> = (0..slot.outputs.len())
            .map(|index| OutputRef { node, index }.into())
            .collect();
        self.cascade(&mut queue);
    }

    /// Drain `queue`, marking fresh ports stale. Returns how many were marked.
    fn cascade(&mut self, queue: &mut VecDeque<PortRef>) -> usize {
        let mut visited = HashSet::new();
        let mut marked = 0;

        while let Some(port) = queue.pop_front() {
            if !visited.insert(port) {
                continue;
            }
            // Dangling handles are skipped.
            let Some(slot) = self.slot_mut(port.node) else {
                continue;
            };
            match port.direction {
                Direction::Input => {
                    let Some(input) = slot.inputs.get_mut(port.index) else {
                        continue;
                    };
                    if !input.cell.status.is_fresh() {
                        continue;
                    }
                    input.cell.status = CacheStatus::Stale;
                    marked += 1;
                    queue.extend((0..slot.outputs.len()).map(|index| {
                        PortRef::from(OutputRef {
                            node: port.node,
                            index,
                        })
                    }));
                }
                Direction::Output => {
                    let Some(output) = slot.outputs.get_mut(port.index) else {
                        continue;
                    };
                    if !output.cell.status.is_fresh() {
                        continue;
                    }
                    output.cell.status = CacheStatus::Stale;
                    marked += 1;
                    queue.extend(output.consumers.iter().copied().map(PortRef::from));
                }
            }
        }

        marked
    }

    /// Ports currently marked stale, for diagnostics.
    pub fn stale_ports(&self) -> Vec<PortRef> {
        let mut stale = Vec::new();
        for id in self.node_ids() {
            let Some(slot) = self.slot(id) else {
                continue;
            };
            for (index, port) in slot.inputs.iter().enumerate() {
                if port.cell.status == CacheStatus::Stale {
                    stale.push(InputRef { node: id, index }.into());
                }
            }
            for (index, port) in slot.outputs.iter().enumerate() {
                if port.cell.status == CacheStatus::Stale {
                    stale.push(OutputRef { node: id, index }.into());
                }
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;
    use crate::graph::{Args, Node, NodeSchema, Outputs, PortSpec};
    use crate::value::Value;

    struct Pass;

    impl Node for Pass {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("Pass")
                .input(PortSpec::new("in").default_value(0))
                .output(PortSpec::new("out"))
        }

        fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
            Ok(args.get(0)?.clone().into())
        }
    }

    /// Echoes its text input, upper-cased when `loud` is set.
    struct Shout {
        loud: bool,
    }

    impl Node for Shout {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("Shout")
                .input(PortSpec::new("in").default_value(""))
                .output(PortSpec::new("out"))
        }

        fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
            let text = args.text(0)?;
            let text = if self.loud {
                text.to_uppercase()
            } else {
                text.to_string()
            };
            Ok(Value::from(text).into())
        }
    }

    /// Build a chain `a -> b -> c` and pull it so everything is fresh.
    fn chain() -> (Graph, [NodeId; 3]) {
        let mut graph = Graph::new();
        let ids = [graph.add_node(Pass), graph.add_node(Pass), graph.add_node(Pass)];
        for pair in ids.windows(2) {
            let out = graph.output(pair[0], "out").unwrap();
            let input = graph.input(pair[1], "in").unwrap();
            graph.connect(out, input).unwrap();
        }
        let last = graph.output(ids[2], "out").unwrap();
        graph.pull(last);
        (graph, ids)
    }

    #[test]
    fn literal_write_marks_downstream_chain() {
        let (mut graph, [a, b, c]) = chain();
        assert!(graph.stale_ports().is_empty());

        let a_in = graph.input(a, "in").unwrap();
        graph.assign(a_in, 5).unwrap();

        assert_eq!(graph.status(a_in), Some(CacheStatus::Fresh));
        for id in [a, b, c] {
            let out = graph.output(id, "out").unwrap();
            assert_eq!(graph.status(out), Some(CacheStatus::Stale));
        }
        assert_eq!(graph.status(graph.input(c, "in").unwrap()), Some(CacheStatus::Stale));
    }

    #[test]
    fn invalidate_stops_at_stale_frontier() {
        let (mut graph, [_, b, _]) = chain();
        let b_in = graph.input(b, "in").unwrap();

        graph.invalidate(b_in);
        let first = graph.stale_ports().len();
        assert_eq!(first, 4);

        // A second walk from the same port does nothing.
        graph.invalidate(b_in);
        assert_eq!(graph.stale_ports().len(), first);
    }

    #[test]
    fn refresh_forces_outputs_and_downstream() {
        let (mut graph, [a, b, c]) = chain();
        graph.refresh(b);

        let a_out = graph.output(a, "out").unwrap();
        assert_eq!(graph.status(a_out), Some(CacheStatus::Fresh));
        assert_eq!(graph.status(graph.output(b, "out").unwrap()), Some(CacheStatus::Stale));
        assert_eq!(graph.status(graph.output(c, "out").unwrap()), Some(CacheStatus::Stale));
        // The refreshed node's own inputs are untouched.
        assert_eq!(graph.status(graph.input(b, "in").unwrap()), Some(CacheStatus::Fresh));
    }

    #[test]
    fn cycle_terminates_and_never_caches() {
        let mut graph = Graph::new();
        let a = graph.add_node(Pass);
        let b = graph.add_node(Pass);
        let a_out = graph.output(a, "out").unwrap();
        let b_out = graph.output(b, "out").unwrap();
        let a_in = graph.input(a, "in").unwrap();
        let b_in = graph.input(b, "in").unwrap();
        graph.connect(a_out, b_in).unwrap();
        graph.connect(b_out, a_in).unwrap();

        // The cycle is broken with b's not-yet-computed output.
        assert!(graph.pull(b_out).is_null());
        assert_eq!(graph.status(a_out), Some(CacheStatus::NeverCacheable));
        assert_eq!(graph.status(b_out), Some(CacheStatus::NeverCacheable));

        graph.invalidate(a_in);
        assert!(graph.pull(b_out).is_null());
    }

    #[test]
    fn removed_producer_resolves_to_default() {
        let (mut graph, [a, _, c]) = chain();
        graph.remove_node(a).unwrap();
        graph.refresh(a);

        let c_out = graph.output(c, "out").unwrap();
        assert_eq!(graph.status(c_out), Some(CacheStatus::Stale));
        assert_eq!(graph.pull(c_out), Value::Int(0));
    }

    #[test]
    fn explicit_invalidate_of_literal_input_is_repeatable() {
        let mut graph = Graph::new();
        let id = graph.add_node(Shout { loud: false });
        let input = graph.input(id, "in").unwrap();
        let output = graph.output(id, "out").unwrap();
        graph.assign(input, "ab").unwrap();
        assert_eq!(graph.pull(output), Value::from("ab"));

        graph.invalidate(input);
        assert_eq!(graph.pull(output), Value::from("ab"));
        // The pull settles the literal input again.
        assert_eq!(graph.status(input), Some(CacheStatus::Fresh));

        graph.node_mut::<Shout>(id).unwrap().loud = true;
        graph.invalidate(input);
        assert_eq!(graph.status(output), Some(CacheStatus::Stale));
        assert_eq!(graph.pull(output), Value::from("AB"));
        assert_eq!(graph.recompute_count(id), 3);
    }

    #[test]
    fn invalidating_twice_before_a_pull_recomputes_once() {
        let mut graph = Graph::new();
        let id = graph.add_node(Shout { loud: false });
        let input = graph.input(id, "in").unwrap();
        let output = graph.output(id, "out").unwrap();
        graph.assign(input, "ab").unwrap();
        graph.pull(output);

        graph.invalidate(input);
        graph.invalidate(input);
        assert_eq!(graph.pull(output), Value::from("ab"));
        assert_eq!(graph.recompute_count(id), 2);
    }

    #[test]
    fn connect_onto_invalidated_input_marks_outputs() {
        let mut graph = Graph::new();
        let source = graph.add_node(Shout { loud: false });
        let sink = graph.add_node(Shout { loud: false });
        let source_in = graph.input(source, "in").unwrap();
        let source_out = graph.output(source, "out").unwrap();
        let sink_in = graph.input(sink, "in").unwrap();
        let sink_out = graph.output(sink, "out").unwrap();
        graph.assign(source_in, "zz").unwrap();
        graph.assign(sink_in, "ab").unwrap();

        // Invalidate, then pull, then rewire.
        graph.invalidate(sink_in);
        assert_eq!(graph.pull(sink_out), Value::from("ab"));
        graph.connect(source_out, sink_in).unwrap();
        assert_eq!(graph.status(sink_out), Some(CacheStatus::Stale));
        assert_eq!(graph.pull(sink_out), Value::from("zz"));

        // Invalidate, then rewire without a pull in between.
        graph.assign(sink_in, "cd").unwrap();
        assert_eq!(graph.pull(sink_out), Value::from("cd"));
        graph.invalidate(sink_in);
        graph.connect(source_out, sink_in).unwrap();
        assert_eq!(graph.pull(sink_out), Value::from("zz"));
    }
}
