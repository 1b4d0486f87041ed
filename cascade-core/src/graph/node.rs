//! Graph Nodes
//!
//! This module defines what a node is from both sides of the engine:
//!
//! - The collaborator side: the [`Node`] trait, implemented by every node
//!   type, with its [`NodeSchema`] of declared ports and its `calculate`
//!   routine.
//! - The graph side: [`NodeSlot`], the arena record holding the node's ports,
//!   caches and diagnostics.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::port::{InputPort, OutputPort, PortSpec};
use crate::error::CalcError;
use crate::value::Value;

/// Generation-checked handle to a node in a [`Graph`](super::Graph).
///
/// The index is a slot in the graph's arena. The generation is bumped each
/// time the slot is freed, so a handle to a removed node never aliases a
/// node added later in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Build a handle from its raw parts.
    pub fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Blanket downcasting support for node types.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of computation.
///
/// Implementors declare their ports once through [`Node::schema`] and turn
/// resolved inputs into outputs in [`Node::calculate`].
///
/// `calculate` must only affect the graph through its return value. Node
/// types may keep internal state (a mode flag, say); after changing it, the
/// collaborator calls [`Graph::refresh`](super::Graph::refresh) so that
/// cached results are recomputed.
pub trait Node: AsAny + Send {
    /// Declared ports, in positional order.
    fn schema(&self) -> NodeSchema;

    /// Compute outputs from inputs.
    ///
    /// `args` holds one value per declared input, in declared order. Sibling
    /// inputs contribute a [`Value::List`] of their producers' values.
    ///
    /// Returning fewer values than declared outputs is allowed: the missing
    /// ones become failure sentinels.
    fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError>;

    /// Whether results must be recomputed on every pull.
    ///
    /// Used for volatile sources such as live device state. Read once when
    /// the node is added; see [`Graph::set_permanent`](super::Graph::set_permanent).
    fn permanent(&self) -> bool {
        false
    }
}

/// The declared ports of a node type.
#[derive(Debug, Clone, Default)]
pub struct NodeSchema {
    pub(crate) type_name: String,
    pub(crate) inputs: IndexMap<String, PortSpec>,
    pub(crate) outputs: IndexMap<String, PortSpec>,
}

impl NodeSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// Declare the next input port.
    pub fn input(mut self, spec: PortSpec) -> Self {
        self.inputs.insert(spec.name.clone(), spec);
        self
    }

    /// Declare the next output port.
    pub fn output(mut self, spec: PortSpec) -> Self {
        self.outputs.insert(spec.name.clone(), spec);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PortSpec> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PortSpec> {
        self.outputs.values()
    }
}

/// Resolved inputs handed to [`Node::calculate`].
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(values: &'a [Value]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Value> {
        self.values.iter()
    }

    /// The value at position `index`.
    pub fn get(&self, index: usize) -> Result<&'a Value, CalcError> {
        self.values
            .get(index)
            .ok_or_else(|| CalcError::new(format!("missing argument {index}")))
    }

    pub fn text(&self, index: usize) -> Result<&'a str, CalcError> {
        let value = self.get(index)?;
        value
            .as_text()
            .ok_or_else(|| mismatch(index, "text", value))
    }

    pub fn float(&self, index: usize) -> Result<f64, CalcError> {
        let value = self.get(index)?;
        value
            .as_float()
            .ok_or_else(|| mismatch(index, "float", value))
    }

    pub fn int(&self, index: usize) -> Result<i64, CalcError> {
        let value = self.get(index)?;
        value.as_int().ok_or_else(|| mismatch(index, "int", value))
    }

    pub fn bool(&self, index: usize) -> Result<bool, CalcError> {
        let value = self.get(index)?;
        value.as_bool().ok_or_else(|| mismatch(index, "bool", value))
    }

    /// The ordered producer values of a sibling input.
    pub fn group(&self, index: usize) -> Result<&'a [Value], CalcError> {
        let value = self.get(index)?;
        value.as_list().ok_or_else(|| mismatch(index, "group", value))
    }
}

fn mismatch(index: usize, expected: &str, found: &Value) -> CalcError {
    // Pass the upstream failure reason through rather than masking it.
    match found.as_null() {
        Some(null) => CalcError::new(null.reason()),
        None => CalcError::new(format!("argument {index}: expected {expected}, got {found}")),
    }
}

/// Results returned by [`Node::calculate`], one per declared output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs(SmallVec<[Value; 2]>);

impl Outputs {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_inner(self) -> SmallVec<[Value; 2]> {
        self.0
    }
}

impl From<Value> for Outputs {
    fn from(value: Value) -> Self {
        let mut values = SmallVec::new();
        values.push(value);
        Self(values)
    }
}

impl From<Vec<Value>> for Outputs {
    fn from(values: Vec<Value>) -> Self {
        Self(SmallVec::from_vec(values))
    }
}

impl FromIterator<Value> for Outputs {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Arena record of a node.
pub(crate) struct NodeSlot {
    pub(crate) name: String,
    pub(crate) schema: NodeSchema,
    pub(crate) behavior: Box<dyn Node>,
    pub(crate) inputs: Vec<InputPort>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) permanent: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) recomputes: u64,
}

impl NodeSlot {
    pub(crate) fn new(name: String, behavior: Box<dyn Node>) -> Self {
        let schema = behavior.schema();
        let inputs = schema.inputs().map(InputPort::new).collect();
        let outputs = schema.outputs().map(OutputPort::new).collect();
        let permanent = behavior.permanent();
        Self {
            name,
            schema,
            behavior,
            inputs,
            outputs,
            permanent,
            last_error: None,
            recomputes: 0,
        }
    }

    pub(crate) fn input_spec(&self, index: usize) -> Option<&PortSpec> {
        self.schema.inputs.get_index(index).map(|(_, spec)| spec)
    }

    pub(crate) fn output_spec(&self, index: usize) -> Option<&PortSpec> {
        self.schema.outputs.get_index(index).map(|(_, spec)| spec)
    }
}

impl fmt::Debug for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSlot")
            .field("name", &self.name)
            .field("type_name", &self.schema.type_name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("permanent", &self.permanent)
            .field("last_error", &self.last_error)
            .field("recomputes", &self.recomputes)
            .finish()
    }
}
