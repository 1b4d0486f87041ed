//! Error types.
//!
//! Wiring mistakes surface as [`GraphError`] at the call that made them.
//! Failures inside a node's `calculate` are [`CalcError`]s and never leave
//! the graph: they become failure sentinels on the node's outputs.

use thiserror::Error;

use crate::graph::{NodeId, PortRef};
use crate::value::ValueKind;

/// Errors returned by graph construction and wiring operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The handle refers to a node that has been removed.
    #[error("node {0} no longer exists")]
    StaleNode(NodeId),

    /// The node type declares no port with that name.
    #[error("node {node} has no {direction} port named `{name}`")]
    UnknownPort {
        node: NodeId,
        direction: &'static str,
        name: String,
    },

    /// The port index is outside the node's declared ports.
    #[error("port {0} is not declared by its node")]
    InvalidPort(PortRef),

    /// `append` was used on a single-cardinality input.
    #[error("input {0} does not accept sibling producers")]
    NotSibling(PortRef),

    /// `detach` named an edge that does not exist.
    #[error("{output} is not a producer of {input}")]
    NotConnected { output: PortRef, input: PortRef },

    /// A value or edge does not satisfy the declared port kind.
    #[error("port {port} expects {expected}, got {found}")]
    TypeMismatch {
        port: PortRef,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The edge would close a dependency cycle.
    #[error("connecting {output} to {input} would create a cycle")]
    Cycle { output: PortRef, input: PortRef },

    /// The node exists but is not of the requested Rust type.
    #[error("node {0} is not of the requested type")]
    NodeType(NodeId),
}

/// A failure reported by a node's `calculate` routine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CalcError {
    reason: String,
}

impl CalcError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<String> for CalcError {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for CalcError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Errors produced by structural-edit commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("command was cancelled")]
    Cancelled,

    #[error("command failed: {0}")]
    Failed(String),

    #[error("command thread panicked")]
    Panicked,
}

/// Errors loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
}
