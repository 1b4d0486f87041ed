//! Recompute
//!
//! The pull half of the engine: bring an output port's cache up to date and
//! return its value.
//!
//! # Algorithm
//!
//! Depth-first from the requested output, with a visited set of outputs and a
//! set of nodes already computed, both scoped to one top-level pull:
//!
//! 1. An output seen before in this pull returns its cached value as-is.
//!    This is what breaks cycles.
//! 2. A fresh output returns its cached value.
//! 3. Otherwise the owning node resolves every producer of every input
//!    (sibling inputs in attachment order), gathers the values in declared
//!    order and runs `calculate`.
//! 4. Results are written to the node's outputs and pushed into the caches
//!    of their consumer inputs.
//! 5. A permanent node, or a node with any producer that did not end fresh,
//!    leaves its outputs [`CacheStatus::NeverCacheable`] so the next pull
//!    recomputes them.
//!
//! A failing `calculate` never escapes: its outputs become failure sentinels
//! and the message is recorded as the node's `last_error`.
//!
//! The walk is recursive, so its depth is bounded by the calling thread's
//! stack. Only stale nodes are descended into; a fresh output ends the branch.

use std::collections::HashSet;

use smallvec::SmallVec;

use super::node::{Args, NodeId};
use super::port::{CacheStatus, Cardinality, Cell, InputRef, OutputRef, PortRef, PortSpec};
use super::Graph;
use crate::error::CalcError;
use crate::value::{NullValue, Value};

/// Bookkeeping for one top-level pull.
#[derive(Debug, Default)]
struct Traversal {
    visited: HashSet<OutputRef>,
    computed: HashSet<NodeId>,
}

impl Graph {
    /// Realized value of `output`, recomputing whatever is out of date.
    ///
    /// Never fails: a dangling handle or a failed computation yields a
    /// failure sentinel.
    ///
    /// The traversal recurses once per stale node on the upstream path, a few
    /// stack frames each. Chains of tens of thousands of stale nodes need a
    /// thread with a larger stack (see [`std::thread::Builder::stack_size`]).
    pub fn pull(&mut self, output: OutputRef) -> Value {
        let _span = tracing::trace_span!("pull", %output).entered();
        let mut traversal = Traversal::default();
        self.resolve(output, &mut traversal);
        self.output_value(output)
    }

    /// Pull every output of `node`, in declared order.
    pub fn pull_node(&mut self, node: NodeId) -> Vec<Value> {
        let count = self.slot(node).map_or(0, |slot| slot.outputs.len());
        let mut traversal = Traversal::default();
        (0..count)
            .map(|index| {
                let output = OutputRef { node, index };
                self.resolve(output, &mut traversal);
                self.output_value(output)
            })
            .collect()
    }

    /// Cached value of an output, without any traversal.
    pub fn output_value(&self, output: OutputRef) -> Value {
        match self
            .slot(output.node)
            .and_then(|slot| slot.outputs.get(output.index))
        {
            Some(port) => port.cell.value.clone(),
            None => Value::null(format!("{output} no longer exists")),
        }
    }

    /// Bring `output` up to date. Returns its status afterwards, or `None`
    /// if the handle is dangling.
    fn resolve(&mut self, output: OutputRef, traversal: &mut Traversal) -> Option<CacheStatus> {
        let status = self
            .slot(output.node)?
            .outputs
            .get(output.index)?
            .cell
            .status;

        if !traversal.visited.insert(output) {
            tracing::trace!(%output, "already visited");
            return Some(status);
        }
        if status.is_fresh() {
            return Some(status);
        }
        if traversal.computed.insert(output.node) {
            self.recompute(output.node, traversal);
        }
        self.status(output)
    }

    fn recompute(&mut self, node: NodeId, traversal: &mut Traversal) {
        let input_count = self.slot(node).map_or(0, |slot| slot.inputs.len());

        let mut parents = CacheStatus::Fresh;
        for index in 0..input_count {
            parents = parents.combine(self.resolve_input(InputRef { node, index }, traversal));
        }

        let Some(args) = self.gather(node) else {
            return;
        };
        let Some(slot) = self.slot_mut(node) else {
            return;
        };

        let expected = slot.outputs.len();
        let outcome = match args {
            Ok(values) => slot.behavior.calculate(&Args::new(&values)),
            Err(err) => Err(err),
        };
        let results: SmallVec<[Value; 2]> = match outcome {
            Ok(outputs) => {
                slot.last_error = None;
                let mut values = outputs.into_inner();
                if values.len() < expected {
                    let reason = format!(
                        "not enough results: expected {expected}, got {}",
                        values.len()
                    );
                    values.resize(expected, Value::Null(NullValue::new(reason)));
                } else if values.len() > expected {
                    tracing::debug!(%node, extra = values.len() - expected, "dropping extra results");
                    values.truncate(expected);
                }
                values
            }
            Err(err) => {
                tracing::warn!(%node, name = %slot.name, error = %err, "calculate failed");
                let reason = err.reason().to_string();
                let values = SmallVec::from_elem(Value::null(reason.clone()), expected);
                slot.last_error = Some(reason);
                values
            }
        };

        slot.recomputes += 1;
        let status = if slot.permanent || !parents.is_fresh() {
            CacheStatus::NeverCacheable
        } else {
            CacheStatus::Fresh
        };

        let mut consumers = Vec::new();
        for (port, value) in slot.outputs.iter_mut().zip(results) {
            port.cell = Cell { value, status };
            consumers.extend(port.consumers.iter().copied());
        }
        tracing::debug!(%node, name = %slot.name, ?status, "recomputed");

        for input in consumers {
            self.refill_input(input);
        }
    }

    /// Resolve every producer of `input` and store the result in its cache.
    /// Returns the combined status of its live producers.
    fn resolve_input(&mut self, input: InputRef, traversal: &mut Traversal) -> CacheStatus {
        let Some(port) = self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        else {
            return CacheStatus::Fresh;
        };
        if port.producers.is_empty() {
            // A literal or default is current by definition, even after an
            // explicit invalidate.
            port.cell.status = CacheStatus::Fresh;
            return CacheStatus::Fresh;
        }

        let producers = port.producers.clone();
        let mut status = CacheStatus::Fresh;
        for producer in producers {
            if let Some(resolved) = self.resolve(producer, traversal) {
                status = status.combine(resolved);
            }
        }
        self.refill_input(input);
        status
    }

    /// Rebuild an input's cache from its producers' cached outputs.
    ///
    /// No traversal happens here: stale producers contribute whatever they
    /// currently hold and mark the input accordingly.
    fn refill_input(&mut self, input: InputRef) {
        let Some(slot) = self.slot(input.node) else {
            return;
        };
        let (Some(spec), Some(port)) = (slot.input_spec(input.index), slot.inputs.get(input.index))
        else {
            return;
        };
        let cardinality = spec.cardinality;

        let mut values = Vec::with_capacity(port.producers.len());
        let mut status = CacheStatus::Fresh;
        for producer in &port.producers {
            let Some(cell) = self
                .slot(producer.node)
                .and_then(|slot| slot.outputs.get(producer.index))
                .map(|port| &port.cell)
            else {
                continue;
            };
            values.push(cell.value.clone());
            status = status.combine(cell.status);
        }

        let value = match cardinality {
            Cardinality::Sibling => Value::List(values),
            Cardinality::Single => match values.pop() {
                Some(value) => value,
                None => spec.fallback("has no live producer"),
            },
        };
        if let Some(port) = self
            .slot_mut(input.node)
            .and_then(|slot| slot.inputs.get_mut(input.index))
        {
            port.cell = Cell { value, status };
        }
    }

    /// Collect a node's input values in declared order, admitting each one
    /// against its declared kind.
    ///
    /// Returns `None` for a dangling node, `Some(Err(_))` when an input is
    /// refused.
    fn gather(&self, node: NodeId) -> Option<Result<Vec<Value>, CalcError>> {
        let slot = self.slot(node)?;
        let policy = self.config.type_policy;
        let gathered = slot
            .inputs
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let kind = slot.input_spec(index).and_then(|spec| spec.kind);
                let at = PortRef::from(InputRef { node, index });
                match &port.cell.value {
                    Value::List(items) if is_sibling(slot.input_spec(index)) => items
                        .iter()
                        .map(|item| policy.admit(at, kind, item.clone()))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::List),
                    value => policy.admit(at, kind, value.clone()),
                }
                .map_err(|err| CalcError::new(err.to_string()))
            })
            .collect();
        Some(gathered)
    }
}

fn is_sibling(spec: Option<&PortSpec>) -> bool {
    spec.is_some_and(|spec| spec.cardinality == Cardinality::Sibling)
}
