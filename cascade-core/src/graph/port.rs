//! Ports and Edges
//!
//! Every node owns an ordered list of input ports and output ports. A port
//! holds one cached value (its cell) and the [`CacheStatus`] of that value.
//!
//! Edges are stored on both ends as handles: an input port lists its
//! producers ([`OutputRef`]s) in attachment order, and an output port lists
//! its consumers ([`InputRef`]s). Handles never keep a node alive. A handle
//! to a removed node simply fails to resolve.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::node::NodeId;
use crate::value::{Value, ValueKind};

/// How many producers an input port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one producer. Attaching a new one detaches the old one.
    #[default]
    Single,

    /// An ordered, unbounded list of producers delivered as one group.
    Sibling,
}

/// Freshness of a port's cached value.
///
/// Ordered by severity so that combining several statuses keeps the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// The cached value is up to date.
    Fresh,

    /// The value was valid for the pull that produced it and must be
    /// recomputed on the next one. Produced by permanent nodes and by
    /// anything downstream of them.
    NeverCacheable,

    /// The value is out of date.
    Stale,
}

impl CacheStatus {
    pub fn is_fresh(self) -> bool {
        self == CacheStatus::Fresh
    }

    /// The worse of two statuses.
    pub fn combine(self, other: CacheStatus) -> CacheStatus {
        self.max(other)
    }
}

/// Input or output side of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Handle to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: NodeId,
    pub index: usize,
}

/// Handle to an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub node: NodeId,
    pub index: usize,
}

/// Handle to a port of either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeId,
    pub direction: Direction,
    pub index: usize,
}

impl From<InputRef> for PortRef {
    fn from(input: InputRef) -> Self {
        PortRef {
            node: input.node,
            direction: Direction::Input,
            index: input.index,
        }
    }
}

impl From<OutputRef> for PortRef {
    fn from(output: OutputRef) -> Self {
        PortRef {
            node: output.node,
            direction: Direction::Output,
            index: output.index,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.direction {
            Direction::Input => "in",
            Direction::Output => "out",
        };
        write!(f, "{}.{}[{}]", self.node, side, self.index)
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PortRef::from(*self).fmt(f)
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PortRef::from(*self).fmt(f)
    }
}

/// Declaration of one port on a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub(crate) name: String,
    pub(crate) default: Option<Value>,
    pub(crate) kind: Option<ValueKind>,
    pub(crate) cardinality: Cardinality,
}

impl PortSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind: None,
            cardinality: Cardinality::Single,
        }
    }

    /// Initial literal held by the port until something is assigned.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restrict the port to values of `kind`.
    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Accept an ordered list of producers.
    pub fn siblings(mut self) -> Self {
        self.cardinality = Cardinality::Sibling;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_kind(&self) -> Option<ValueKind> {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Value an input falls back to when nothing is assigned or connected.
    pub(crate) fn fallback(&self, reason: &str) -> Value {
        match (&self.default, self.cardinality) {
            (Some(value), Cardinality::Sibling) => group_literal(value.clone()),
            (Some(value), Cardinality::Single) => value.clone(),
            (None, Cardinality::Sibling) => Value::List(Vec::new()),
            (None, Cardinality::Single) => {
                Value::null(format!("input `{}` {}", self.name, reason))
            }
        }
    }
}

/// A literal written into a sibling port is a group: lists are taken as-is,
/// anything else becomes a group of one.
pub(crate) fn group_literal(value: Value) -> Value {
    match value {
        Value::List(_) => value,
        other => Value::List(vec![other]),
    }
}

/// A cached value and its freshness.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cell {
    pub(crate) value: Value,
    pub(crate) status: CacheStatus,
}

impl Cell {
    pub(crate) fn fresh(value: Value) -> Self {
        Self {
            value,
            status: CacheStatus::Fresh,
        }
    }

    pub(crate) fn stale(value: Value) -> Self {
        Self {
            value,
            status: CacheStatus::Stale,
        }
    }
}

/// Graph-side state of an input port.
#[derive(Debug)]
pub(crate) struct InputPort {
    pub(crate) cell: Cell,
    pub(crate) producers: SmallVec<[OutputRef; 1]>,
}

impl InputPort {
    pub(crate) fn new(spec: &PortSpec) -> Self {
        Self {
            cell: Cell::fresh(spec.fallback("has no value")),
            producers: SmallVec::new(),
        }
    }
}

/// Graph-side state of an output port.
#[derive(Debug)]
pub(crate) struct OutputPort {
    pub(crate) cell: Cell,
    pub(crate) consumers: Vec<InputRef>,
}

impl OutputPort {
    pub(crate) fn new(spec: &PortSpec) -> Self {
        Self {
            cell: Cell::stale(Value::null(format!(
                "output `{}` has not been computed",
                spec.name
            ))),
            consumers: Vec::new(),
        }
    }
}
